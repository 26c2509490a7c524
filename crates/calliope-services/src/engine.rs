//! Engine: transport scheduler and the command/event loop
//!
//! One engine instance owns one project; multiple open projects are
//! multiple independent instances. All mutations arrive as commands and
//! are applied between ticks, never inside a render pass, so events go
//! out in command-application order and position updates are strictly
//! increasing between loop wraps.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use calliope_core::{Project, TransportState};
use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use tracing::{debug, info};

use crate::audio_effects::PluginCatalog;
use crate::control::{self, Command, EngineState, Event};
use crate::mixer::{self, MasterBuffer};

enum EngineMsg {
    Command(Command),
    Subscribe(Sender<Event>),
    AudioSink(Sender<MasterBuffer>),
    Shutdown,
}

/// The engine proper. Use it directly for offline (stepped) rendering,
/// or hand it to [`Engine::spawn`] to drive it from a realtime tick
/// thread.
pub struct Engine {
    state: EngineState,
    subscribers: Vec<Sender<Event>>,
    audio_tx: Option<Sender<MasterBuffer>>,
    last_tick: Option<Instant>,
}

impl Engine {
    pub fn new(project: Project, catalog: PluginCatalog) -> Self {
        Self {
            state: EngineState::new(project, catalog),
            subscribers: Vec::new(),
            audio_tx: None,
            last_tick: None,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Rendered windows are pushed here; a full sink drops windows
    /// rather than blocking the tick loop.
    pub fn set_audio_sink(&mut self, tx: Sender<MasterBuffer>) {
        self.audio_tx = Some(tx);
    }

    /// Register an observer. It immediately receives a full-state
    /// snapshot, then every subsequent event in order.
    pub fn subscribe_sender(&mut self, tx: Sender<Event>) {
        if tx.send(control::snapshot(&self.state)).is_ok() {
            self.subscribers.push(tx);
        }
    }

    /// Apply one command and broadcast the resulting events
    pub fn handle_command(&mut self, command: Command) {
        let events = control::apply(&mut self.state, command);
        self.broadcast(events);
    }

    /// One scheduler tick: advance the transport by `dt` seconds
    /// (wrapping at the loop end), render the next buffer window and
    /// emit a position update. Returns the rendered window while the
    /// transport is rolling.
    pub fn step(&mut self, dt: f64) -> Option<MasterBuffer> {
        if !self.state.project.transport.is_rolling() {
            return None;
        }

        self.state.project.transport.advance(dt);
        let t0 = self.state.project.transport.position;
        let t1 = t0 + self.state.project.buffer_duration();

        let out = mixer::render_window(
            &self.state.project,
            &mut self.state.chains,
            &mut self.state.master_chain,
            t0,
            t1,
        );

        if let Some(tx) = &self.audio_tx {
            if tx.try_send(out.clone()).is_err() {
                debug!("Audio sink full; dropping rendered window");
            }
        }
        self.broadcast(vec![Event::PositionUpdate { position: t0 }]);

        // Plain playback stops when it runs out of material; recording
        // keeps rolling so new takes can extend the project.
        let duration = self.state.project.duration();
        if self.state.project.transport.state == TransportState::Playing
            && !self.state.project.transport.loop_enabled
            && duration > 0.0
            && t1 >= duration
        {
            self.handle_command(Command::StopProject);
        }

        Some(out)
    }

    fn tick(&mut self) {
        if !self.state.project.transport.is_rolling() {
            self.last_tick = None;
            return;
        }
        let now = Instant::now();
        let dt = self
            .last_tick
            .map(|t| (now - t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_tick = Some(now);
        self.step(dt);
    }

    fn broadcast(&mut self, events: Vec<Event>) {
        for event in events {
            self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Move the engine onto its own thread, ticking at the buffer
    /// cadence. Commands are applied the moment they arrive between
    /// ticks, so a stop always takes effect before the next render; the
    /// ticker holds at most one pending tick, so an overrunning render
    /// is followed by a single immediate tick instead of a backlog.
    pub fn spawn(mut self) -> calliope_core::Result<EngineHandle> {
        let (tx, rx) = unbounded::<EngineMsg>();
        let cadence = Duration::from_secs_f64(self.state.project.buffer_duration());

        let join = thread::Builder::new()
            .name("calliope-engine".into())
            .spawn(move || {
                let ticker = tick(cadence);
                info!(cadence_ms = cadence.as_millis() as u64, "Engine running");
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(EngineMsg::Command(command)) => self.handle_command(command),
                            Ok(EngineMsg::Subscribe(tx)) => self.subscribe_sender(tx),
                            Ok(EngineMsg::AudioSink(tx)) => self.audio_tx = Some(tx),
                            Ok(EngineMsg::Shutdown) | Err(_) => break,
                        },
                        recv(ticker) -> _ => self.tick(),
                    }
                }
                info!("Engine stopped");
            })?;

        Ok(EngineHandle { tx, join: Some(join) })
    }
}

/// Cloneable-by-channel handle to a spawned engine
pub struct EngineHandle {
    tx: Sender<EngineMsg>,
    join: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) {
        let _ = self.tx.send(EngineMsg::Command(command));
    }

    /// Attach a new observer; the first received event is a snapshot
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        let _ = self.tx.send(EngineMsg::Subscribe(tx));
        rx
    }

    pub fn set_audio_sink(&self, tx: Sender<MasterBuffer>) {
        let _ = self.tx.send(EngineMsg::AudioSink(tx));
    }

    pub fn shutdown(mut self) {
        let _ = self.tx.send(EngineMsg::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(EngineMsg::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
