//! Buffer-accurate render of clips, chains and automation into the
//! stereo master bus

use std::collections::HashMap;

use calliope_core::{Project, Track, TrackId, TrackKind};

use crate::audio_effects::{EffectChain, StereoChain};

/// Per-track effect chains, keyed off the owning track
pub type TrackChains = HashMap<TrackId, EffectChain>;

/// One rendered stereo window
#[derive(Debug, Clone, PartialEq)]
pub struct MasterBuffer {
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds
    pub end: f64,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl MasterBuffer {
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Interleave to stereo frames for device output or WAV export
    pub fn interleaved(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }
}

/// Constant-power pan: -1.0 hard left, 0.0 center, 1.0 hard right
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Parse an automation target of the form `fx:<slot>:<param>`
pub fn parse_fx_target(name: &str) -> Option<(usize, &str)> {
    let rest = name.strip_prefix("fx:")?;
    let (slot, param) = rest.split_once(':')?;
    Some((slot.parse().ok()?, param))
}

/// Render the half-open window `[t0, t1)` into a stereo master buffer.
///
/// Rendering never mutates clip or track data, so re-rendering the same
/// window with unchanged state yields the same result; effect chains are
/// the only state that advances.
pub fn render_window(
    project: &Project,
    chains: &mut TrackChains,
    master_chain: &mut StereoChain,
    t0: f64,
    t1: f64,
) -> MasterBuffer {
    let sr = project.sample_rate as f64;
    let frames = ((t1 - t0) * sr).round() as usize;
    let mid = (t0 + t1) / 2.0;
    let has_solo = project.has_solo();

    let mut left = vec![0.0f32; frames];
    let mut right = vec![0.0f32; frames];

    // Buses collect routed track output before rendering themselves
    let mut bus_input: HashMap<&str, Vec<f32>> = project
        .tracks
        .iter()
        .filter(|t| t.kind == TrackKind::Bus)
        .map(|t| (t.name.as_str(), vec![0.0f32; frames]))
        .collect();

    for track in &project.tracks {
        if track.kind == TrackKind::Bus || !audible(track, has_solo) {
            continue;
        }

        let buf = sum_clips(track, t0, frames, sr);
        let (buf, pan) = process_strip(track, chains.get_mut(&track.id), buf, mid);

        let routed = track
            .output
            .as_deref()
            .and_then(|name| bus_input.get_mut(name));
        match routed {
            Some(bus_buf) => {
                for (dst, src) in bus_buf.iter_mut().zip(&buf) {
                    *dst += src;
                }
            }
            None => mix_into(&mut left, &mut right, &buf, pan),
        }
    }

    for track in &project.tracks {
        if track.kind != TrackKind::Bus {
            continue;
        }
        let Some(buf) = bus_input.remove(track.name.as_str()) else {
            continue;
        };
        if !audible(track, has_solo) {
            continue;
        }
        let (buf, pan) = process_strip(track, chains.get_mut(&track.id), buf, mid);
        mix_into(&mut left, &mut right, &buf, pan);
    }

    master_chain.process(&mut left, &mut right);
    let master = project.master_volume.clamp(0.0, 2.0);
    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        *l *= master;
        *r *= master;
    }

    MasterBuffer { start: t0, end: t1, left, right }
}

fn audible(track: &Track, has_solo: bool) -> bool {
    !track.mute && (!has_solo || track.solo)
}

/// Sum every intersecting clip's gain-and-fade-adjusted samples; clips
/// overlapping in time add together rather than replacing each other.
fn sum_clips(track: &Track, t0: f64, frames: usize, sr: f64) -> Vec<f32> {
    let mut buf = vec![0.0f32; frames];
    let t1 = t0 + frames as f64 / sr;
    for clip in track.clips_in(t0, t1) {
        for (i, slot) in buf.iter_mut().enumerate() {
            let t = t0 + i as f64 / sr;
            if let Some(s) = clip.sample_at(t) {
                *slot += s;
            }
        }
    }
    buf
}

/// Run one track strip: effect-parameter automation, the effect chain,
/// then volume. Volume and pan come from automation lanes when present,
/// from the track's stored values otherwise; the track itself is never
/// written.
fn process_strip(
    track: &Track,
    chain: Option<&mut EffectChain>,
    mut buf: Vec<f32>,
    mid: f64,
) -> (Vec<f32>, f32) {
    if let Some(chain) = chain {
        for lane in &track.lanes {
            if let Some((slot, param)) = parse_fx_target(&lane.parameter) {
                if chain.has_param(slot, param) {
                    chain.set_param(slot, param, lane.value_at(mid));
                }
            }
        }
        chain.process(&mut buf);
    }

    let volume = track
        .lane("volume")
        .map_or(track.volume, |l| l.value_at(mid))
        .clamp(0.0, 2.0);
    let pan = track
        .lane("pan")
        .map_or(track.pan, |l| l.value_at(mid))
        .clamp(-1.0, 1.0);

    for s in &mut buf {
        *s *= volume;
    }
    (buf, pan)
}

fn mix_into(left: &mut [f32], right: &mut [f32], buf: &[f32], pan: f32) {
    let (gl, gr) = pan_gains(pan);
    for ((l, r), &s) in left.iter_mut().zip(right.iter_mut()).zip(buf) {
        *l += s * gl;
        *r += s * gr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calliope_core::{AutomationLane, AutomationPoint, Clip, CurveKind, TrackKind};

    const SR: u32 = 1000;

    fn project_with_track() -> (Project, TrackId) {
        let mut project = Project::new(SR, 100);
        let tid = project.add_track(TrackKind::Audio, "one");
        (project, tid)
    }

    fn constant_clip(project: &mut Project, tid: TrackId, start: f64, secs: f64, gain: f32) {
        let id = project.alloc_clip_id();
        let samples = vec![1.0f32; (secs * SR as f64) as usize];
        let mut clip = Clip::audio(id, tid, start, samples, SR);
        clip.gain = gain;
        project.track_mut(tid).unwrap().add_clip(clip);
    }

    fn render(project: &Project, t0: f64, t1: f64) -> MasterBuffer {
        let mut chains = TrackChains::new();
        let mut master = StereoChain::new();
        render_window(project, &mut chains, &mut master, t0, t1)
    }

    #[test]
    fn overlapping_clips_sum_additively() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 0.5);
        constant_clip(&mut project, tid, 0.0, 1.0, 0.5);

        let out = render(&project, 0.2, 0.3);
        let (gl, _) = pan_gains(0.0);
        // Two half-gain clips behave like one unity clip, never just one
        for &l in &out.left {
            assert!((l - 1.0 * gl).abs() < 1e-5);
        }
    }

    #[test]
    fn rendering_is_idempotent_without_stateful_effects() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 0.8);
        let a = render(&project, 0.1, 0.2);
        let b = render(&project, 0.1, 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn solo_silences_other_tracks() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        let other = project.add_track(TrackKind::Audio, "two");
        constant_clip(&mut project, other, 0.0, 1.0, 1.0);
        project.track_mut(other).unwrap().solo = true;

        let out = render(&project, 0.0, 0.1);
        let (gl, _) = pan_gains(0.0);
        for &l in &out.left {
            assert!((l - gl).abs() < 1e-5);
        }
    }

    #[test]
    fn muted_tracks_are_skipped() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        project.track_mut(tid).unwrap().mute = true;
        let out = render(&project, 0.0, 0.1);
        assert!(out.left.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn hard_pan_sends_one_channel_only() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        project.track_mut(tid).unwrap().set_pan(-1.0);
        let out = render(&project, 0.0, 0.1);
        assert!(out.left.iter().all(|&s| (s - 1.0).abs() < 1e-5));
        assert!(out.right.iter().all(|&s| s.abs() < 1e-5));
    }

    #[test]
    fn bus_tracks_aggregate_routed_output() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        project.track_mut(tid).unwrap().output = Some("drums".to_string());
        let bus = project.add_track(TrackKind::Bus, "drums");
        project.track_mut(bus).unwrap().set_volume(0.5);

        let out = render(&project, 0.0, 0.1);
        let (gl, _) = pan_gains(0.0);
        for &l in &out.left {
            assert!((l - 0.5 * gl).abs() < 1e-5);
        }
    }

    #[test]
    fn volume_automation_overrides_without_mutating_track() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        let mut lane = AutomationLane::new("volume");
        lane.add_point(AutomationPoint::new(0.0, 0.0, CurveKind::Linear));
        project.track_mut(tid).unwrap().upsert_lane(lane);

        let out = render(&project, 0.0, 0.1);
        assert!(out.left.iter().all(|&s| s == 0.0));
        assert_eq!(project.track(tid).unwrap().volume, 1.0);
    }

    #[test]
    fn master_volume_scales_the_mix() {
        let (mut project, tid) = project_with_track();
        constant_clip(&mut project, tid, 0.0, 1.0, 1.0);
        project.set_master_volume(0.25);
        let out = render(&project, 0.0, 0.1);
        let (gl, _) = pan_gains(0.0);
        for &l in &out.left {
            assert!((l - 0.25 * gl).abs() < 1e-5);
        }
    }

    #[test]
    fn stretched_clip_renders_at_half_speed() {
        let (mut project, tid) = project_with_track();
        let id = project.alloc_clip_id();
        let samples: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let mut clip = Clip::audio(id, tid, 0.0, samples, SR);
        clip.time_stretch(0.5);
        project.track_mut(tid).unwrap().add_clip(clip);

        // At t=1.0 the stretched clip reads source position 0.5 s
        let out = render(&project, 1.0, 1.001);
        let (gl, _) = pan_gains(0.0);
        assert!((out.left[0] - 500.0 * gl).abs() < 1.0);
    }
}
