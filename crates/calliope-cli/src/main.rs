//! calliope-cli: drive the engine through its control surface from the
//! command line: offline bounces and live playback of WAV mixes

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calliope_core::{Project, TrackKind};
use calliope_services::control::{Command, Event};
use calliope_services::engine::Engine;
use calliope_services::mixer::MasterBuffer;
use calliope_services::{PluginCatalog, RealtimeOutputStream, media};
use clap::{Parser, Subcommand};
use crossbeam_channel::bounded;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SAMPLE_RATE: u32 = 44_100;
const BUFFER_SIZE: usize = 512;

#[derive(Parser)]
#[command(name = "calliope", about = "Multitrack audio engine front-end")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Mix input WAV files offline and bounce the master bus to a file
    Render {
        /// Input WAV files, one audio track each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output WAV file
        #[arg(short, long)]
        out: PathBuf,
        /// Project tempo
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// Plugin catalog JSON file
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Mix input WAV files and play them on the default output device
    Play {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calliope=info".parse()?),
        )
        .init();

    tracing::info!("Starting calliope");

    match Cli::parse().command {
        Cmd::Render { inputs, out, bpm, catalog } => render(&inputs, &out, bpm, catalog.as_deref()),
        Cmd::Play { inputs, bpm } => play(&inputs, bpm),
    }
}

fn render(inputs: &[PathBuf], out: &Path, bpm: f64, catalog: Option<&Path>) -> Result<()> {
    let mut engine = build_engine(inputs, bpm, catalog)?;
    let windows = render_offline(&mut engine);
    media::write_bounce(out, &windows, SAMPLE_RATE)?;
    println!("Bounced {} windows to {}", windows.len(), out.display());
    Ok(())
}

fn play(inputs: &[PathBuf], bpm: f64) -> Result<()> {
    let engine = build_engine(inputs, bpm, None)?;
    let handle = engine.spawn().context("failed to start engine thread")?;

    let (tx, rx) = bounded(8);
    let stream = RealtimeOutputStream::start(rx)?;
    handle.set_audio_sink(tx);

    let events = handle.subscribe();
    handle.send(Command::PlayProject);
    for event in events.iter() {
        if matches!(event, Event::PlaybackStopped { .. }) {
            break;
        }
    }

    stream.stop();
    handle.shutdown();
    Ok(())
}

/// Build an engine with one audio track per input file, loaded and
/// resampled to the project rate through the control surface.
fn build_engine(inputs: &[PathBuf], bpm: f64, catalog: Option<&Path>) -> Result<Engine> {
    let catalog = match catalog {
        Some(path) => PluginCatalog::load(path)?,
        None => PluginCatalog::default(),
    };

    let mut engine = Engine::new(Project::new(SAMPLE_RATE, BUFFER_SIZE), catalog);
    engine.handle_command(Command::SetBpm { bpm });

    for input in inputs {
        let (samples, rate) = media::read_wav_mono(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let samples = media::resample(&samples, rate, SAMPLE_RATE)?;

        let name = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string());
        engine.handle_command(Command::CreateTrack {
            name,
            track_type: TrackKind::Audio,
        });
        let track_id = engine
            .state()
            .project
            .tracks
            .last()
            .context("track was not created")?
            .id
            .0;
        engine.handle_command(Command::AddClip {
            track_id,
            start: 0.0,
            samples,
            sample_rate: SAMPLE_RATE,
        });
    }
    Ok(engine)
}

/// Step the engine at its buffer cadence until playback runs out of
/// material, collecting every rendered window.
fn render_offline(engine: &mut Engine) -> Vec<MasterBuffer> {
    engine.handle_command(Command::PlayProject);
    let dt = engine.state().project.buffer_duration();

    let mut windows = Vec::new();
    if let Some(window) = engine.step(0.0) {
        windows.push(window);
    }
    while engine.state().project.transport.is_rolling() {
        match engine.step(dt) {
            Some(window) => windows.push(window),
            None => break,
        }
    }
    windows
}
