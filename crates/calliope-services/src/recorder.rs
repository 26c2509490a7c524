//! Capture of incoming audio into new clips on armed tracks

use std::collections::HashMap;

use calliope_core::{Clip, ClipId, Project, RecordMode, TrackId};
use tracing::{debug, info};

use crate::mixer::TrackChains;

/// An in-progress capture for one armed track
#[derive(Debug)]
struct Capture {
    started_at: f64,
    samples: Vec<f32>,
}

/// Collects incoming audio per armed track while the transport records
/// and freezes each capture into a clip on stop.
#[derive(Debug, Default)]
pub struct Recorder {
    captures: HashMap<TrackId, Capture>,
}

/// A clip finalized by [`Recorder::finalize`]
#[derive(Debug, Clone, Copy)]
pub struct FinalizedClip {
    pub clip_id: ClipId,
    pub track_id: TrackId,
    pub start: f64,
    pub duration: f64,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a capture for every armed track at the current transport
    /// position. Any capture left over from an aborted pass is dropped.
    pub fn begin(&mut self, project: &Project) {
        self.captures.clear();
        let position = project.transport.position;
        for track in project.tracks.iter().filter(|t| t.armed) {
            self.captures.insert(
                track.id,
                Capture {
                    started_at: position,
                    samples: Vec::new(),
                },
            );
        }
        info!(tracks = self.captures.len(), position, "Recording started");
    }

    pub fn is_active(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Append incoming mono samples to a track's capture. Returns false
    /// when the track has no open capture (not armed when the pass began).
    pub fn feed(&mut self, track_id: TrackId, samples: &[f32]) -> bool {
        let Some(capture) = self.captures.get_mut(&track_id) else {
            return false;
        };
        capture.samples.extend_from_slice(samples);
        true
    }

    /// Freeze every non-empty capture into a clip. The track's effect
    /// chain is applied to the captured audio first, baking the chain
    /// state at record time into the clip. The configured record mode
    /// decides how clips already in the recorded range are treated.
    pub fn finalize(&mut self, project: &mut Project, chains: &mut TrackChains) -> Vec<FinalizedClip> {
        let mode = project.transport.record_mode;
        let sample_rate = project.sample_rate;
        let mut finalized = Vec::new();

        for (track_id, mut capture) in std::mem::take(&mut self.captures) {
            if capture.samples.is_empty() {
                debug!(track = track_id.0, "Dropping empty capture");
                continue;
            }
            if project.track(track_id).is_none() {
                debug!(track = track_id.0, "Capture target deleted during recording");
                continue;
            }

            if let Some(chain) = chains.get_mut(&track_id) {
                chain.process(&mut capture.samples);
            }

            let clip_id = project.alloc_clip_id();
            let mut clip = Clip::audio(clip_id, track_id, capture.started_at, capture.samples, sample_rate);
            clip.name = format!("Take {}", clip_id.0);
            let start = clip.start;
            let duration = clip.duration;

            // Clips spanning the whole recorded range split in two under
            // replace mode; allocate their ids before borrowing the track.
            let mut spare_ids = Vec::new();
            if mode == RecordMode::Replace {
                let spans = project
                    .track(track_id)
                    .map_or(0, |t| {
                        t.clips
                            .iter()
                            .filter(|c| c.start < start && c.end() > start + duration)
                            .count()
                    });
                spare_ids = (0..spans).map(|_| project.alloc_clip_id()).collect();
            }

            let Some(track) = project.track_mut(track_id) else {
                continue;
            };
            match mode {
                RecordMode::Overdub => {}
                RecordMode::Replace => {
                    carve_range(&mut track.clips, start, start + duration, spare_ids);
                }
                RecordMode::Merge => {
                    merge_overlaps(track, &mut clip, sample_rate);
                }
            }
            track.add_clip(clip);

            info!(track = track_id.0, clip = clip_id.0, start, duration, "Recorded clip");
            finalized.push(FinalizedClip { clip_id, track_id, start, duration });
        }
        finalized
    }
}

/// Remove, truncate or split existing clips so `[t0, t1)` is free
fn carve_range(clips: &mut Vec<Clip>, t0: f64, t1: f64, mut spare_ids: Vec<ClipId>) {
    clips.retain(|c| !(c.start >= t0 && c.end() <= t1));
    let mut tails = Vec::new();
    for clip in clips.iter_mut() {
        if !clip.intersects(t0, t1) {
            continue;
        }
        if clip.start < t0 && clip.end() > t1 {
            // Spans the whole range: keep the head, split off the tail
            if let Some(id) = spare_ids.pop() {
                let mut tail = clip.clone();
                tail.id = id;
                tail.trim_head(t1 - tail.start);
                tails.push(tail);
            }
            clip.trim_tail(t0 - clip.start);
        } else if clip.start < t0 {
            clip.trim_tail(t0 - clip.start);
        } else {
            clip.trim_head(t1 - clip.start);
        }
    }
    clips.extend(tails);
}

/// Sum overlapping clip audio into the new clip, then drop the originals
fn merge_overlaps(track: &mut calliope_core::Track, clip: &mut Clip, sample_rate: u32) {
    let t0 = clip.start;
    let t1 = clip.end();
    let overlapping: Vec<ClipId> = track
        .clips_in(t0, t1)
        .map(|c| c.id)
        .collect();

    let calliope_core::ClipSource::Audio { samples, .. } = &mut clip.source else {
        return;
    };
    for id in &overlapping {
        let Some(existing) = track.clip(*id) else {
            continue;
        };
        for (i, slot) in samples.iter_mut().enumerate() {
            let t = t0 + i as f64 / sample_rate as f64;
            if let Some(s) = existing.sample_at(t) {
                *slot += s;
            }
        }
    }
    for id in overlapping {
        track.remove_clip(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calliope_core::{EngineError, TrackKind};

    const SR: u32 = 1000;

    fn project() -> Project {
        Project::new(SR, 100)
    }

    fn armed_track(project: &mut Project, name: &str) -> TrackId {
        let id = project.add_track(TrackKind::Audio, name);
        project.track_mut(id).unwrap().armed = true;
        id
    }

    #[test]
    fn stop_finalizes_one_clip_per_armed_track() {
        let mut project = project();
        let a = armed_track(&mut project, "a");
        let b = armed_track(&mut project, "b");
        project.transport.seek(1.5);
        project.transport.record();

        let mut rec = Recorder::new();
        rec.begin(&project);
        rec.feed(a, &vec![0.1; 500]);
        rec.feed(b, &vec![0.2; 250]);

        let mut chains = TrackChains::new();
        let clips = rec.finalize(&mut project, &mut chains);
        assert_eq!(clips.len(), 2);
        for clip in &clips {
            assert!((clip.start - 1.5).abs() < 1e-9);
        }
        assert_eq!(project.track(a).unwrap().clips.len(), 1);
        assert_eq!(project.track(b).unwrap().clips.len(), 1);
    }

    #[test]
    fn unarmed_tracks_capture_nothing() {
        let mut project = project();
        let armed = armed_track(&mut project, "a");
        let idle = project.add_track(TrackKind::Audio, "b");
        project.transport.record();

        let mut rec = Recorder::new();
        rec.begin(&project);
        assert!(rec.feed(armed, &[0.5; 10]));
        assert!(!rec.feed(idle, &[0.5; 10]));
    }

    #[test]
    fn record_then_stretch_scenario() {
        // 2 s of audio recorded from position 0, then stretched to 4 s
        let mut project = project();
        let tid = armed_track(&mut project, "a");
        project.transport.record();

        let mut rec = Recorder::new();
        rec.begin(&project);
        rec.feed(tid, &vec![0.5; 2 * SR as usize]);

        let mut chains = TrackChains::new();
        let clips = rec.finalize(&mut project, &mut chains);
        let clip_id = clips[0].clip_id;
        let clip = project.find_clip_mut(clip_id).unwrap();
        assert!((clip.start - 0.0).abs() < 1e-9);
        assert!((clip.duration - 2.0).abs() < 1e-9);

        clip.time_stretch(0.5);
        assert!((clip.duration - 4.0).abs() < 1e-9);
    }

    #[test]
    fn replace_mode_carves_existing_clips() {
        let mut project = project();
        let tid = armed_track(&mut project, "a");
        // Existing clip spanning 0..4 s
        let existing = project.alloc_clip_id();
        project
            .track_mut(tid)
            .unwrap()
            .add_clip(Clip::audio(existing, tid, 0.0, vec![1.0; 4 * SR as usize], SR));

        project.transport.record_mode = RecordMode::Replace;
        project.transport.seek(1.0);
        project.transport.record();

        let mut rec = Recorder::new();
        rec.begin(&project);
        rec.feed(tid, &vec![0.5; SR as usize]); // 1 s: covers 1..2

        let mut chains = TrackChains::new();
        rec.finalize(&mut project, &mut chains);

        let track = project.track(tid).unwrap();
        assert_eq!(track.clips.len(), 3); // head, tail, new take
        let old_head = track.clip(existing).unwrap();
        assert!((old_head.duration - 1.0).abs() < 1e-9);
        // The recorded range holds only the new take
        let in_range: Vec<_> = track.clips_in(1.2, 1.3).collect();
        assert_eq!(in_range.len(), 1);
        assert!((in_range[0].start - 1.0).abs() < 1e-9);
    }

    #[test]
    fn merge_mode_sums_and_removes_overlaps() {
        let mut project = project();
        let tid = armed_track(&mut project, "a");
        let existing = project.alloc_clip_id();
        project
            .track_mut(tid)
            .unwrap()
            .add_clip(Clip::audio(existing, tid, 0.0, vec![0.25; SR as usize], SR));

        project.transport.record_mode = RecordMode::Merge;
        project.transport.record();

        let mut rec = Recorder::new();
        rec.begin(&project);
        rec.feed(tid, &vec![0.5; SR as usize]);

        let mut chains = TrackChains::new();
        let clips = rec.finalize(&mut project, &mut chains);

        let track = project.track(tid).unwrap();
        assert_eq!(track.clips.len(), 1);
        let merged = track.clip(clips[0].clip_id).unwrap();
        assert!((merged.sample_at(0.5).unwrap() - 0.75).abs() < 1e-5);
    }

    #[test]
    fn chain_state_is_baked_into_the_clip() {
        use crate::audio_effects::{EffectKind, create_effect};

        let mut project = project();
        let tid = armed_track(&mut project, "a");
        project.transport.record();

        let mut chains = TrackChains::new();
        let chain = chains.entry(tid).or_default();
        chain.add(create_effect(EffectKind::Distortion, SR as f32).unwrap());
        chain.set_param(0, "drive", 10.0);

        let mut rec = Recorder::new();
        rec.begin(&project);
        rec.feed(tid, &[0.5; 100]);
        let clips = rec.finalize(&mut project, &mut chains);

        let clip = project.track(tid).unwrap().clip(clips[0].clip_id).unwrap();
        // 0.5 driven by 10 soft-clips well above unity
        assert!(clip.sample_at(0.01).unwrap() > 1.0);
    }

    #[test]
    fn error_type_names_missing_tracks() {
        // Recorder ignores deleted tracks; the engine reports them via
        // EngineError when a command addresses one directly.
        let err = EngineError::TrackNotFound(7);
        assert_eq!(err.to_string(), "Track not found: 7");
    }
}
