//! Project: global settings and the track list

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipId};
use crate::track::{Track, TrackId, TrackKind};
use crate::transport::Transport;

/// The root of the engine's data model: all tracks plus global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Render window size in frames
    pub buffer_size: usize,
    /// Tempo in BPM
    pub bpm: f64,
    pub time_sig_num: u8,
    pub time_sig_denom: u8,
    /// Quantization grid subdivision per whole note (16 = 16th notes)
    pub grid_subdivision: u16,
    /// Master output gain (linear)
    pub master_volume: f32,
    pub transport: Transport,
    pub tracks: Vec<Track>,
    next_track_id: u64,
    next_clip_id: u64,
}

impl Project {
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            buffer_size,
            bpm: 120.0,
            time_sig_num: 4,
            time_sig_denom: 4,
            grid_subdivision: 16,
            master_volume: 1.0,
            transport: Transport::new(),
            tracks: Vec::new(),
            next_track_id: 1,
            next_clip_id: 1,
        }
    }

    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        self.tracks.push(Track::new(id, kind, name));
        id
    }

    /// Remove a track and its clips (cascading)
    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id == id)?;
        Some(self.tracks.remove(pos))
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn alloc_clip_id(&mut self) -> ClipId {
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        id
    }

    /// Find a clip anywhere in the project
    pub fn find_clip(&self, id: ClipId) -> Option<(&Track, &Clip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clip(id).map(|c| (t, c)))
    }

    pub fn find_clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.tracks.iter_mut().find_map(|t| t.clip_mut(id))
    }

    pub fn has_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    pub fn has_armed(&self) -> bool {
        self.tracks.iter().any(|t| t.armed)
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.clamp(20.0, 999.0);
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 2.0);
    }

    /// Duration of one render window in seconds
    pub fn buffer_duration(&self) -> f64 {
        self.buffer_size as f64 / self.sample_rate as f64
    }

    /// One quantization grid step in seconds at the current tempo
    pub fn grid_step(&self) -> f64 {
        60.0 / self.bpm * 4.0 / self.grid_subdivision as f64
    }

    /// Total duration in seconds (end of last clip)
    pub fn duration(&self) -> f64 {
        self.tracks.iter().map(Track::end).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_step_follows_tempo() {
        let mut project = Project::new(44_100, 512);
        // 16th notes at 120 BPM: 0.5 s per beat / 4
        assert!((project.grid_step() - 0.125).abs() < 1e-9);
        project.set_bpm(240.0);
        assert!((project.grid_step() - 0.0625).abs() < 1e-9);
    }

    #[test]
    fn track_removal_cascades_clips() {
        let mut project = Project::new(44_100, 512);
        let tid = project.add_track(TrackKind::Audio, "vox");
        let cid = project.alloc_clip_id();
        project
            .track_mut(tid)
            .unwrap()
            .add_clip(Clip::audio(cid, tid, 0.0, vec![0.0; 100], 44_100));
        assert!(project.find_clip(cid).is_some());
        project.remove_track(tid);
        assert!(project.find_clip(cid).is_none());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut project = Project::new(44_100, 512);
        let a = project.add_track(TrackKind::Audio, "a");
        project.remove_track(a);
        let b = project.add_track(TrackKind::Audio, "b");
        assert_ne!(a, b);
    }
}
