//! Control surface: the command/event protocol and its dispatcher
//!
//! Commands mutate engine state through [`apply`]; every mutation is
//! answered with broadcast events describing the resulting state delta.
//! Invalid references are logged and ignored, out-of-range values clamp,
//! and malformed messages are dropped at the decode boundary: no command
//! can crash the engine.

use std::path::Path;

use calliope_core::{
    AutomationLane, AutomationPoint, Clip, ClipId, ClipSource, Project, RecordMode, TrackId,
    TrackKind, analysis,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio_effects::{EffectDescription, EffectKind, HostedPluginEffect, PluginCatalog, StereoChain, create_effect};
use crate::mixer::{TrackChains, parse_fx_target};
use crate::recorder::Recorder;

/// Onset analysis window for quantization, in seconds
const ONSET_WINDOW_SECS: f64 = 0.025;
/// Grid-snap tolerance as a fraction of one grid step
const SNAP_TOLERANCE: f64 = 0.25;
/// Onset energy-ratio threshold between adjacent analysis windows
const ONSET_THRESHOLD: f32 = 1.5;

/// Everything a command can touch, owned by one engine instance
#[derive(Debug)]
pub struct EngineState {
    pub project: Project,
    pub chains: TrackChains,
    pub master_chain: StereoChain,
    pub recorder: Recorder,
    pub catalog: PluginCatalog,
}

impl EngineState {
    pub fn new(project: Project, catalog: PluginCatalog) -> Self {
        Self {
            project,
            chains: TrackChains::new(),
            master_chain: StereoChain::new(),
            recorder: Recorder::new(),
            catalog,
        }
    }
}

/// Inbound command. `track_id: None` in the effect commands addresses
/// the master chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CreateTrack { name: String, track_type: TrackKind },
    DeleteTrack { track_id: u64 },
    RecordTrack { track_id: u64, samples: Vec<f32> },
    PlayProject,
    StopProject,
    RecordProject,
    SetBpm { bpm: f64 },
    SetTimeSignature { numerator: u8, denominator: u8 },
    SetQuantizeGrid { subdivision: u16 },
    AddEffect { track_id: u64, effect_type: EffectKind },
    AddMasterEffect { effect_type: EffectKind },
    RemoveEffect { track_id: Option<u64>, slot: usize },
    SetEffectEnabled { track_id: Option<u64>, slot: usize, enabled: bool },
    SetEffectParam { track_id: Option<u64>, slot: usize, name: String, value: f32 },
    LoadPlugin { track_id: u64, plugin_id: String },
    SetPluginPreset { track_id: Option<u64>, slot: usize, preset: String },
    QuantizeAudio { clip_id: u64 },
    TimeStretch { clip_id: u64, ratio: f64 },
    PitchShift { clip_id: u64, semitones: f64 },
    AddAutomation { track_id: u64, parameter: String, points: Vec<AutomationPoint> },
    AddClip { track_id: u64, start: f64, samples: Vec<f32>, sample_rate: u32 },
    DeleteClip { clip_id: u64 },
    SetClipParams {
        clip_id: u64,
        #[serde(default)]
        gain: Option<f32>,
        #[serde(default)]
        fade_in: Option<f64>,
        #[serde(default)]
        fade_out: Option<f64>,
        #[serde(default)]
        reversed: Option<bool>,
    },
    SetTrackVolume { track_id: u64, volume: f32 },
    SetTrackPan { track_id: u64, pan: f32 },
    SetTrackMute { track_id: u64, mute: bool },
    SetTrackSolo { track_id: u64, solo: bool },
    SetTrackArmed { track_id: u64, armed: bool },
    SetTrackOutput { track_id: u64, output: Option<String> },
    SetLoopRegion { start: f64, end: f64, enabled: bool },
    SetRecordMode { mode: RecordMode },
    SetMasterVolume { volume: f32 },
    Seek { position: f64 },
    SaveClip { clip_id: u64, path: String },
}

/// One chain's description inside a snapshot; `track_id: None` is the
/// master chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainView {
    pub track_id: Option<u64>,
    pub effects: Vec<EffectDescription>,
}

/// Broadcast event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TrackCreated { track_id: u64, name: String, track_type: TrackKind },
    TrackDeleted { track_id: u64 },
    TrackChanged { track_id: u64, volume: f32, pan: f32, mute: bool, solo: bool, armed: bool, output: Option<String> },
    ClipRecorded { clip_id: u64, track_id: u64, start: f64, duration: f64 },
    ClipAdded { clip_id: u64, track_id: u64, start: f64, duration: f64 },
    ClipDeleted { clip_id: u64 },
    ClipChanged { clip_id: u64, gain: f32, fade_in: f64, fade_out: f64, reversed: bool },
    PlaybackStarted { position: f64 },
    PlaybackStopped { position: f64 },
    RecordingStarted { position: f64 },
    BpmChanged { bpm: f64 },
    TimeSignatureChanged { numerator: u8, denominator: u8 },
    QuantizeGridChanged { subdivision: u16 },
    EffectAdded { track_id: Option<u64>, slot: usize, effect_type: EffectKind },
    EffectRemoved { track_id: Option<u64>, slot: usize },
    EffectToggled { track_id: Option<u64>, slot: usize, enabled: bool },
    EffectParamChanged { track_id: Option<u64>, slot: usize, name: String, value: f32 },
    PluginLoaded { track_id: u64, slot: usize, plugin_id: String, name: String },
    PluginPresetChanged { track_id: Option<u64>, slot: usize, preset: String },
    AudioQuantized { clip_id: u64, shifted: usize },
    ClipTimeStretched { clip_id: u64, ratio: f64, duration: f64 },
    ClipPitchShifted { clip_id: u64, semitones: f64 },
    AutomationAdded { track_id: u64, parameter: String, points: usize },
    LoopChanged { start: f64, end: f64, enabled: bool },
    RecordModeChanged { mode: RecordMode },
    MasterVolumeChanged { volume: f32 },
    PositionUpdate { position: f64 },
    ClipSaved { clip_id: u64, path: String },
    Snapshot { project: Project, chains: Vec<ChainView> },
    CommandFailed { reason: String },
}

/// Decode one wire message; malformed input is logged and dropped
pub fn decode(line: &str) -> Option<Command> {
    match serde_json::from_str(line) {
        Ok(command) => Some(command),
        Err(err) => {
            warn!(%err, "Ignoring malformed command");
            None
        }
    }
}

/// Encode an event for the wire
pub fn encode(event: &Event) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

/// The full-state snapshot a newly connected observer receives
pub fn snapshot(state: &EngineState) -> Event {
    let mut chains: Vec<ChainView> = state
        .project
        .tracks
        .iter()
        .filter_map(|t| {
            state.chains.get(&t.id).map(|c| ChainView {
                track_id: Some(t.id.0),
                effects: c.describe(),
            })
        })
        .collect();
    chains.push(ChainView {
        track_id: None,
        effects: state.master_chain.describe(),
    });
    Event::Snapshot {
        project: state.project.clone(),
        chains,
    }
}

/// Apply one command, returning the events to broadcast. Exactly one
/// category of state change happens per command; commands that reference
/// missing tracks, clips or plugins change nothing.
pub fn apply(state: &mut EngineState, command: Command) -> Vec<Event> {
    match command {
        Command::CreateTrack { name, track_type } => {
            let id = state.project.add_track(track_type, name.clone());
            state.chains.insert(id, Default::default());
            info!(track = id.0, %name, "Track created");
            vec![Event::TrackCreated { track_id: id.0, name, track_type }]
        }

        Command::DeleteTrack { track_id } => {
            if state.project.remove_track(TrackId(track_id)).is_none() {
                warn!(track = track_id, "delete_track: unknown track");
                return vec![];
            }
            state.chains.remove(&TrackId(track_id));
            vec![Event::TrackDeleted { track_id }]
        }

        Command::RecordTrack { track_id, samples } => {
            if !state.project.transport.is_recording() {
                warn!(track = track_id, "record_track: transport is not recording");
                return vec![];
            }
            if !state.recorder.feed(TrackId(track_id), &samples) {
                warn!(track = track_id, "record_track: track is not armed");
            }
            vec![]
        }

        Command::PlayProject => {
            if state.project.transport.is_rolling() {
                return vec![];
            }
            state.project.transport.play();
            vec![Event::PlaybackStarted { position: state.project.transport.position }]
        }

        Command::StopProject => {
            if !state.project.transport.is_rolling() {
                return vec![];
            }
            let was_recording = state.project.transport.is_recording();
            state.project.transport.stop();

            let mut events = Vec::new();
            if was_recording {
                for clip in state.recorder.finalize(&mut state.project, &mut state.chains) {
                    events.push(Event::ClipRecorded {
                        clip_id: clip.clip_id.0,
                        track_id: clip.track_id.0,
                        start: clip.start,
                        duration: clip.duration,
                    });
                }
            }
            // Effect tails only persist across buffers of continuous playback
            for chain in state.chains.values_mut() {
                chain.reset();
            }
            state.master_chain.reset();

            events.push(Event::PlaybackStopped { position: state.project.transport.position });
            events
        }

        Command::RecordProject => {
            if state.project.transport.is_recording() {
                return vec![];
            }
            if !state.project.has_armed() {
                warn!("record_project: no armed tracks");
                return vec![];
            }
            state.project.transport.record();
            state.recorder.begin(&state.project);
            vec![Event::RecordingStarted { position: state.project.transport.position }]
        }

        Command::SetBpm { bpm } => {
            state.project.set_bpm(bpm);
            vec![Event::BpmChanged { bpm: state.project.bpm }]
        }

        Command::SetTimeSignature { numerator, denominator } => {
            let numerator = numerator.clamp(1, 32);
            let denominator = if denominator.is_power_of_two() { denominator.clamp(1, 32) } else { 4 };
            state.project.time_sig_num = numerator;
            state.project.time_sig_denom = denominator;
            vec![Event::TimeSignatureChanged { numerator, denominator }]
        }

        Command::SetQuantizeGrid { subdivision } => {
            let subdivision = subdivision.clamp(1, 128);
            state.project.grid_subdivision = subdivision;
            vec![Event::QuantizeGridChanged { subdivision }]
        }

        Command::AddEffect { track_id, effect_type } => {
            if state.project.track(TrackId(track_id)).is_none() {
                warn!(track = track_id, "add_effect: unknown track");
                return vec![];
            }
            let Some(effect) = create_effect(effect_type, state.project.sample_rate as f32) else {
                warn!(?effect_type, "add_effect: kind requires a plugin descriptor");
                return vec![];
            };
            let chain = state.chains.entry(TrackId(track_id)).or_default();
            let slot = chain.add(effect);
            vec![Event::EffectAdded { track_id: Some(track_id), slot, effect_type }]
        }

        Command::AddMasterEffect { effect_type } => {
            let Some(slot) = state
                .master_chain
                .add_kind(effect_type, state.project.sample_rate as f32)
            else {
                warn!(?effect_type, "add_master_effect: kind requires a plugin descriptor");
                return vec![];
            };
            vec![Event::EffectAdded { track_id: None, slot, effect_type }]
        }

        Command::RemoveEffect { track_id, slot } => {
            let removed = match track_id {
                Some(id) => state
                    .chains
                    .get_mut(&TrackId(id))
                    .is_some_and(|c| c.remove(slot).is_some()),
                None => state.master_chain.remove(slot),
            };
            if !removed {
                warn!(?track_id, slot, "remove_effect: no such slot");
                return vec![];
            }
            vec![Event::EffectRemoved { track_id, slot }]
        }

        Command::SetEffectEnabled { track_id, slot, enabled } => {
            let ok = match track_id {
                Some(id) => state
                    .chains
                    .get_mut(&TrackId(id))
                    .is_some_and(|c| c.set_enabled(slot, enabled)),
                None => state.master_chain.set_enabled(slot, enabled),
            };
            if !ok {
                warn!(?track_id, slot, "set_effect_enabled: no such slot");
                return vec![];
            }
            vec![Event::EffectToggled { track_id, slot, enabled }]
        }

        Command::SetEffectParam { track_id, slot, name, value } => {
            let applied = match track_id {
                Some(id) => state.chains.get_mut(&TrackId(id)).and_then(|c| {
                    c.set_param(slot, &name, value);
                    c.param_value(slot, &name)
                }),
                None => {
                    state.master_chain.set_param(slot, &name, value);
                    state.master_chain.param_value(slot, &name)
                }
            };
            let Some(value) = applied else {
                warn!(?track_id, slot, %name, "set_effect_param: no such parameter");
                return vec![];
            };
            vec![Event::EffectParamChanged { track_id, slot, name, value }]
        }

        Command::LoadPlugin { track_id, plugin_id } => {
            if state.project.track(TrackId(track_id)).is_none() {
                warn!(track = track_id, "load_plugin: unknown track");
                return vec![];
            }
            let Some(descriptor) = state.catalog.get(&plugin_id) else {
                warn!(%plugin_id, "load_plugin: not in catalog");
                return vec![];
            };
            let plugin = HostedPluginEffect::new(descriptor.clone());
            let name = descriptor.name.clone();
            let chain = state.chains.entry(TrackId(track_id)).or_default();
            let slot = chain.add(Box::new(plugin));
            info!(track = track_id, %plugin_id, %name, slot, "Plugin loaded");
            vec![Event::PluginLoaded { track_id, slot, plugin_id, name }]
        }

        Command::SetPluginPreset { track_id, slot, preset } => {
            let ok = match track_id {
                Some(id) => state
                    .chains
                    .get_mut(&TrackId(id))
                    .is_some_and(|c| c.set_preset(slot, &preset)),
                None => false,
            };
            if !ok {
                warn!(?track_id, slot, %preset, "set_plugin_preset: no such preset");
                return vec![];
            }
            vec![Event::PluginPresetChanged { track_id, slot, preset }]
        }

        Command::QuantizeAudio { clip_id } => {
            let grid_step = state.project.grid_step();
            let Some(clip) = state.project.find_clip_mut(ClipId(clip_id)) else {
                warn!(clip = clip_id, "quantize_audio: unknown clip");
                return vec![];
            };
            let ClipSource::Audio { samples, sample_rate } = &mut clip.source else {
                warn!(clip = clip_id, "quantize_audio: clip has no audio");
                return vec![];
            };

            let sr = *sample_rate as f64;
            let window = ((ONSET_WINDOW_SECS * sr) as usize).max(2);
            let onsets = analysis::detect_onsets(samples, window, window / 2, ONSET_THRESHOLD);
            let shifts = analysis::grid_shifts(&onsets, grid_step * sr, grid_step * sr * SNAP_TOLERANCE);
            if !shifts.is_empty() {
                *samples = analysis::apply_shifts(samples, &onsets, &shifts);
            }
            info!(clip = clip_id, onsets = onsets.len(), shifted = shifts.len(), "Quantized clip");
            vec![Event::AudioQuantized { clip_id, shifted: shifts.len() }]
        }

        Command::TimeStretch { clip_id, ratio } => {
            let ratio = ratio.clamp(0.05, 20.0);
            let Some(clip) = state.project.find_clip_mut(ClipId(clip_id)) else {
                warn!(clip = clip_id, "time_stretch: unknown clip");
                return vec![];
            };
            clip.time_stretch(ratio);
            vec![Event::ClipTimeStretched { clip_id, ratio, duration: clip.duration }]
        }

        Command::PitchShift { clip_id, semitones } => {
            let semitones = semitones.clamp(-48.0, 48.0);
            let Some(clip) = state.project.find_clip_mut(ClipId(clip_id)) else {
                warn!(clip = clip_id, "pitch_shift: unknown clip");
                return vec![];
            };
            clip.pitch_shift(semitones);
            vec![Event::ClipPitchShifted { clip_id, semitones }]
        }

        Command::AddAutomation { track_id, parameter, points } => {
            let resolvable = parameter == "volume"
                || parameter == "pan"
                || parse_fx_target(&parameter).is_some_and(|(slot, param)| {
                    state
                        .chains
                        .get(&TrackId(track_id))
                        .is_some_and(|c| c.has_param(slot, param))
                });
            if !resolvable {
                warn!(track = track_id, %parameter, "add_automation: unknown parameter");
                return vec![];
            }
            let Some(track) = state.project.track_mut(TrackId(track_id)) else {
                warn!(track = track_id, "add_automation: unknown track");
                return vec![];
            };
            let mut lane = AutomationLane::new(parameter.clone());
            for point in points {
                lane.add_point(point);
            }
            let count = lane.points.len();
            track.upsert_lane(lane);
            vec![Event::AutomationAdded { track_id, parameter, points: count }]
        }

        Command::AddClip { track_id, start, samples, sample_rate } => {
            if sample_rate == 0 || samples.is_empty() {
                warn!(track = track_id, "add_clip: empty audio");
                return vec![];
            }
            if state.project.track(TrackId(track_id)).is_none() {
                warn!(track = track_id, "add_clip: unknown track");
                return vec![];
            }
            let clip_id = state.project.alloc_clip_id();
            let mut clip = Clip::audio(clip_id, TrackId(track_id), start.max(0.0), samples, sample_rate);
            clip.name = format!("Clip {}", clip_id.0);
            let duration = clip.duration;
            let Some(track) = state.project.track_mut(TrackId(track_id)) else {
                return vec![];
            };
            track.add_clip(clip);
            vec![Event::ClipAdded { clip_id: clip_id.0, track_id, start: start.max(0.0), duration }]
        }

        Command::SetClipParams { clip_id, gain, fade_in, fade_out, reversed } => {
            let Some(clip) = state.project.find_clip_mut(ClipId(clip_id)) else {
                warn!(clip = clip_id, "set_clip_params: unknown clip");
                return vec![];
            };
            if let Some(gain) = gain {
                clip.gain = gain.clamp(0.0, 2.0);
            }
            if let Some(fade_in) = fade_in {
                clip.fade_in = fade_in.clamp(0.0, clip.duration);
            }
            if let Some(fade_out) = fade_out {
                clip.fade_out = fade_out.clamp(0.0, clip.duration);
            }
            if let Some(reversed) = reversed {
                clip.reversed = reversed;
            }
            vec![Event::ClipChanged {
                clip_id,
                gain: clip.gain,
                fade_in: clip.fade_in,
                fade_out: clip.fade_out,
                reversed: clip.reversed,
            }]
        }

        Command::DeleteClip { clip_id } => {
            let removed = state
                .project
                .tracks
                .iter_mut()
                .any(|t| t.remove_clip(ClipId(clip_id)).is_some());
            if !removed {
                warn!(clip = clip_id, "delete_clip: unknown clip");
                return vec![];
            }
            vec![Event::ClipDeleted { clip_id }]
        }

        Command::SetTrackVolume { track_id, volume } => {
            track_change(state, track_id, |t| t.set_volume(volume))
        }
        Command::SetTrackPan { track_id, pan } => {
            track_change(state, track_id, |t| t.set_pan(pan))
        }
        Command::SetTrackMute { track_id, mute } => {
            track_change(state, track_id, |t| t.mute = mute)
        }
        Command::SetTrackSolo { track_id, solo } => {
            track_change(state, track_id, |t| t.solo = solo)
        }
        Command::SetTrackArmed { track_id, armed } => {
            track_change(state, track_id, |t| t.armed = armed)
        }
        Command::SetTrackOutput { track_id, output } => {
            track_change(state, track_id, |t| t.output = output)
        }

        Command::SetLoopRegion { start, end, enabled } => {
            if end <= start {
                warn!(start, end, "set_loop_region: empty region");
                return vec![];
            }
            state.project.transport.set_loop(start, end, enabled);
            let t = &state.project.transport;
            vec![Event::LoopChanged { start: t.loop_start, end: t.loop_end, enabled: t.loop_enabled }]
        }

        Command::SetRecordMode { mode } => {
            state.project.transport.record_mode = mode;
            vec![Event::RecordModeChanged { mode }]
        }

        Command::SetMasterVolume { volume } => {
            state.project.set_master_volume(volume);
            vec![Event::MasterVolumeChanged { volume: state.project.master_volume }]
        }

        Command::Seek { position } => {
            state.project.transport.seek(position);
            vec![Event::PositionUpdate { position: state.project.transport.position }]
        }

        Command::SaveClip { clip_id, path } => {
            let Some((_, clip)) = state.project.find_clip(ClipId(clip_id)) else {
                warn!(clip = clip_id, "save_clip: unknown clip");
                return vec![];
            };
            let ClipSource::Audio { samples, sample_rate } = &clip.source else {
                warn!(clip = clip_id, "save_clip: clip has no audio");
                return vec![];
            };
            // I/O failures leave engine state untouched and are reported
            // back to the caller rather than crashing anything.
            match crate::media::write_wav_mono(Path::new(&path), samples, *sample_rate) {
                Ok(()) => vec![Event::ClipSaved { clip_id, path }],
                Err(err) => {
                    warn!(clip = clip_id, %err, "save_clip failed");
                    vec![Event::CommandFailed { reason: err.to_string() }]
                }
            }
        }
    }
}

fn track_change(
    state: &mut EngineState,
    track_id: u64,
    change: impl FnOnce(&mut calliope_core::Track),
) -> Vec<Event> {
    let Some(track) = state.project.track_mut(TrackId(track_id)) else {
        warn!(track = track_id, "track command: unknown track");
        return vec![];
    };
    change(track);
    vec![Event::TrackChanged {
        track_id,
        volume: track.volume,
        pan: track.pan,
        mute: track.mute,
        solo: track.solo,
        armed: track.armed,
        output: track.output.clone(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 1000;

    fn state() -> EngineState {
        EngineState::new(Project::new(SR, 100), PluginCatalog::default())
    }

    fn create_track(state: &mut EngineState, name: &str) -> u64 {
        let events = apply(state, Command::CreateTrack {
            name: name.into(),
            track_type: TrackKind::Audio,
        });
        let Event::TrackCreated { track_id, .. } = events[0] else {
            panic!("expected track_created");
        };
        track_id
    }

    #[test]
    fn create_and_delete_track_round_trip() {
        let mut s = state();
        let id = create_track(&mut s, "drums");
        assert!(s.project.track(TrackId(id)).is_some());

        let events = apply(&mut s, Command::DeleteTrack { track_id: id });
        assert!(matches!(events[0], Event::TrackDeleted { track_id } if track_id == id));
        assert!(s.project.track(TrackId(id)).is_none());
    }

    #[test]
    fn invalid_references_are_ignored_without_state_change() {
        let mut s = state();
        assert!(apply(&mut s, Command::DeleteTrack { track_id: 99 }).is_empty());
        assert!(apply(&mut s, Command::TimeStretch { clip_id: 99, ratio: 2.0 }).is_empty());
        assert!(apply(&mut s, Command::LoadPlugin { track_id: 1, plugin_id: "x".into() }).is_empty());
        assert!(s.project.tracks.is_empty());
    }

    #[test]
    fn malformed_wire_input_is_dropped() {
        assert!(decode("{\"type\":\"no_such_command\"}").is_none());
        assert!(decode("not json").is_none());
        assert!(decode("{\"type\":\"play_project\"}").is_some());
    }

    #[test]
    fn set_bpm_while_playing_keeps_position_and_state() {
        let mut s = state();
        apply(&mut s, Command::PlayProject);
        s.project.transport.advance(1.0);

        let events = apply(&mut s, Command::SetBpm { bpm: 140.0 });
        assert!(matches!(events[0], Event::BpmChanged { bpm } if bpm == 140.0));
        assert!(s.project.transport.is_rolling());
        assert!((s.project.transport.position - 1.0).abs() < 1e-9);
        // The new tempo grid takes effect immediately
        assert!((s.project.grid_step() - 60.0 / 140.0 * 4.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn record_requires_an_armed_track() {
        let mut s = state();
        create_track(&mut s, "a");
        assert!(apply(&mut s, Command::RecordProject).is_empty());
    }

    #[test]
    fn record_stop_finalizes_clips_at_record_start() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        apply(&mut s, Command::SetTrackArmed { track_id: id, armed: true });
        apply(&mut s, Command::Seek { position: 2.0 });
        apply(&mut s, Command::RecordProject);
        apply(&mut s, Command::RecordTrack { track_id: id, samples: vec![0.5; 2 * SR as usize] });
        s.project.transport.advance(2.0);

        let events = apply(&mut s, Command::StopProject);
        let Event::ClipRecorded { start, duration, .. } = events[0] else {
            panic!("expected clip_recorded, got {:?}", events[0]);
        };
        assert!((start - 2.0).abs() < 1e-9);
        assert!((duration - 2.0).abs() < 1e-6);
        assert!(matches!(events[1], Event::PlaybackStopped { .. }));
    }

    #[test]
    fn effect_params_report_clamped_values() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        apply(&mut s, Command::AddEffect { track_id: id, effect_type: EffectKind::Compressor });

        let events = apply(&mut s, Command::SetEffectParam {
            track_id: Some(id),
            slot: 0,
            name: "ratio".into(),
            value: 100.0,
        });
        assert!(matches!(&events[0], Event::EffectParamChanged { value, .. } if *value == 20.0));
    }

    #[test]
    fn master_chain_is_addressed_with_null_track() {
        let mut s = state();
        let events = apply(&mut s, Command::AddMasterEffect { effect_type: EffectKind::Delay });
        assert!(matches!(events[0], Event::EffectAdded { track_id: None, slot: 0, .. }));

        let events = apply(&mut s, Command::SetEffectEnabled { track_id: None, slot: 0, enabled: false });
        assert!(matches!(events[0], Event::EffectToggled { enabled: false, .. }));
    }

    #[test]
    fn load_plugin_from_catalog() {
        use crate::audio_effects::{PluginDescriptor, PluginKind};

        let mut s = state();
        s.catalog = PluginCatalog::new(vec![PluginDescriptor {
            id: "acme.verb".into(),
            name: "AcmeVerb".into(),
            vendor: "Acme".into(),
            version: "1.0".into(),
            kind: PluginKind::Effect,
            presets: vec![],
            latency_samples: 0,
            params: vec![],
        }]);
        let id = create_track(&mut s, "a");

        let events = apply(&mut s, Command::LoadPlugin { track_id: id, plugin_id: "acme.verb".into() });
        assert!(matches!(&events[0], Event::PluginLoaded { name, .. } if name == "AcmeVerb"));
        assert_eq!(s.chains[&TrackId(id)].len(), 1);
    }

    #[test]
    fn quantize_snaps_then_becomes_a_noop() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        // 120 BPM, 16ths: grid every 125 samples at 1 kHz
        let mut samples = vec![0.0f32; 1000];
        samples[130] = 1.0;
        samples[385] = 1.0;
        apply(&mut s, Command::AddClip { track_id: id, start: 0.0, samples, sample_rate: SR });

        let clip_id = s.project.track(TrackId(id)).unwrap().clips[0].id.0;
        let events = apply(&mut s, Command::QuantizeAudio { clip_id });
        assert!(matches!(events[0], Event::AudioQuantized { shifted: 2, .. }));

        let events = apply(&mut s, Command::QuantizeAudio { clip_id });
        assert!(matches!(events[0], Event::AudioQuantized { shifted: 0, .. }));
    }

    #[test]
    fn automation_targets_must_resolve() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        let points = vec![AutomationPoint::new(0.0, 1.0, Default::default())];

        assert!(apply(&mut s, Command::AddAutomation {
            track_id: id,
            parameter: "wibble".into(),
            points: points.clone(),
        })
        .is_empty());

        apply(&mut s, Command::AddEffect { track_id: id, effect_type: EffectKind::Delay });
        let events = apply(&mut s, Command::AddAutomation {
            track_id: id,
            parameter: "fx:0:wet".into(),
            points,
        });
        assert!(matches!(events[0], Event::AutomationAdded { points: 1, .. }));
    }

    #[test]
    fn snapshot_lists_all_chains() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        apply(&mut s, Command::AddEffect { track_id: id, effect_type: EffectKind::Reverb });
        apply(&mut s, Command::AddMasterEffect { effect_type: EffectKind::Eq });

        let Event::Snapshot { project, chains } = snapshot(&s) else {
            panic!("expected snapshot");
        };
        assert_eq!(project.tracks.len(), 1);
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].track_id, Some(id));
        assert_eq!(chains[0].effects[0].kind, EffectKind::Reverb);
        assert_eq!(chains[1].track_id, None);
    }

    #[test]
    fn clip_params_clamp_and_reverse() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        apply(&mut s, Command::AddClip {
            track_id: id,
            start: 0.0,
            samples: vec![0.5; 1000],
            sample_rate: SR,
        });
        let clip_id = s.project.track(TrackId(id)).unwrap().clips[0].id.0;

        let events = apply(&mut s, Command::SetClipParams {
            clip_id,
            gain: Some(5.0),
            fade_in: Some(10.0),
            fade_out: None,
            reversed: Some(true),
        });
        let Event::ClipChanged { gain, fade_in, reversed, .. } = events[0] else {
            panic!("expected clip_changed");
        };
        assert_eq!(gain, 2.0);
        assert!((fade_in - 1.0).abs() < 1e-9); // clamped to the clip duration
        assert!(reversed);
    }

    #[test]
    fn quantize_grid_follows_subdivision_changes() {
        let mut s = state();
        apply(&mut s, Command::SetQuantizeGrid { subdivision: 8 });
        // 8ths at 120 BPM: 0.25 s per grid step
        assert!((s.project.grid_step() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn save_clip_reports_io_failures_without_state_change() {
        let mut s = state();
        let id = create_track(&mut s, "a");
        apply(&mut s, Command::AddClip {
            track_id: id,
            start: 0.0,
            samples: vec![0.5; 100],
            sample_rate: SR,
        });
        let clip_id = s.project.track(TrackId(id)).unwrap().clips[0].id.0;

        let good = std::env::temp_dir().join("calliope_save_clip_test.wav");
        let events = apply(&mut s, Command::SaveClip {
            clip_id,
            path: good.to_string_lossy().into_owned(),
        });
        assert!(matches!(events[0], Event::ClipSaved { .. }));
        let _ = std::fs::remove_file(&good);

        let events = apply(&mut s, Command::SaveClip {
            clip_id,
            path: "/nonexistent-dir/clip.wav".into(),
        });
        assert!(matches!(events[0], Event::CommandFailed { .. }));
        assert_eq!(s.project.track(TrackId(id)).unwrap().clips.len(), 1);
    }

    #[test]
    fn command_wire_format_matches_the_protocol() {
        let cmd = decode("{\"type\":\"set_bpm\",\"bpm\":140}").unwrap();
        assert!(matches!(cmd, Command::SetBpm { bpm } if bpm == 140.0));

        let encoded = encode(&Event::BpmChanged { bpm: 140.0 });
        assert!(encoded.contains("\"type\":\"bpm_changed\""));
    }
}
