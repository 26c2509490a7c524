//! Track representation

use serde::{Deserialize, Serialize};

use crate::automation::AutomationLane;
use crate::clip::{Clip, ClipId};

/// Unique identifier for tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

/// Track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Midi,
    Instrument,
    Bus,
}

/// A named lane owning clips, automation and mix parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    /// Volume (linear gain, 0.0 to 2.0)
    pub volume: f32,
    /// Pan (-1.0 left, 0.0 center, 1.0 right)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    /// Armed for recording
    pub armed: bool,
    /// Input routing label
    pub input: String,
    /// Output routing: the name of a bus track, or `None` for the master
    pub output: Option<String>,
    pub clips: Vec<Clip>,
    pub lanes: Vec<AutomationLane>,
}

impl Track {
    pub fn new(id: TrackId, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            armed: false,
            input: String::new(),
            output: None,
            clips: Vec::new(),
            lanes: Vec::new(),
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 2.0);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn add_clip(&mut self, clip: Clip) {
        self.clips.push(clip);
    }

    pub fn remove_clip(&mut self, clip_id: ClipId) -> Option<Clip> {
        let pos = self.clips.iter().position(|c| c.id == clip_id)?;
        Some(self.clips.remove(pos))
    }

    pub fn clip(&self, clip_id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn clip_mut(&mut self, clip_id: ClipId) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == clip_id)
    }

    /// Clips overlapping the half-open window `[t0, t1)`
    pub fn clips_in(&self, t0: f64, t1: f64) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(move |c| c.intersects(t0, t1))
    }

    /// End of the last clip in seconds
    pub fn end(&self) -> f64 {
        self.clips.iter().map(Clip::end).fold(0.0, f64::max)
    }

    pub fn lane(&self, parameter: &str) -> Option<&AutomationLane> {
        self.lanes.iter().find(|l| l.parameter == parameter)
    }

    /// Insert or replace the automation lane for a parameter
    pub fn upsert_lane(&mut self, lane: AutomationLane) {
        if let Some(existing) = self.lanes.iter_mut().find(|l| l.parameter == lane.parameter) {
            *existing = lane;
        } else {
            self.lanes.push(lane);
        }
    }
}
