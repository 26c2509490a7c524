//! Audio and MIDI clip representations

use serde::{Deserialize, Serialize};

use crate::track::TrackId;

/// Unique identifier for clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u64);

/// A single MIDI note event, placed in beats relative to the clip start
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MidiNote {
    /// MIDI note number (0-127, 60 = middle C)
    pub pitch: u8,
    /// Velocity (0-127)
    pub velocity: u8,
    pub start_beats: f64,
    pub length_beats: f64,
}

/// What a clip plays back: decoded PCM or MIDI note events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClipSource {
    Audio {
        /// Mono samples, skipped during serialization
        #[serde(skip)]
        samples: Vec<f32>,
        sample_rate: u32,
    },
    Midi {
        notes: Vec<MidiNote>,
    },
}

/// A timeline-placed region of audio or MIDI on one track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub track: TrackId,
    pub name: String,
    /// Start position in seconds (project-relative)
    pub start: f64,
    /// Effective length on the timeline in seconds
    pub duration: f64,
    /// Offset into the source in source seconds
    pub offset: f64,
    /// Gain multiplier (1.0 = unity)
    pub gain: f32,
    pub fade_in: f64,
    pub fade_out: f64,
    pub reversed: bool,
    /// Accumulated time-stretch factor; source seconds consumed per
    /// timeline second. 1.0 = unmodified.
    pub stretch: f64,
    /// Pitch shift in semitones; resamples by 2^(semitones/12) at render
    /// time without changing `duration`
    pub pitch: f64,
    pub source: ClipSource,
}

impl Clip {
    /// Create an audio clip from mono samples
    pub fn audio(id: ClipId, track: TrackId, start: f64, samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = samples.len() as f64 / sample_rate as f64;
        Self {
            id,
            track,
            name: String::new(),
            start,
            duration,
            offset: 0.0,
            gain: 1.0,
            fade_in: 0.0,
            fade_out: 0.0,
            reversed: false,
            stretch: 1.0,
            pitch: 0.0,
            source: ClipSource::Audio { samples, sample_rate },
        }
    }

    /// Create a MIDI clip from note events
    pub fn midi(id: ClipId, track: TrackId, start: f64, duration: f64, notes: Vec<MidiNote>) -> Self {
        Self {
            id,
            track,
            name: String::new(),
            start,
            duration,
            offset: 0.0,
            gain: 1.0,
            fade_in: 0.0,
            fade_out: 0.0,
            reversed: false,
            stretch: 1.0,
            pitch: 0.0,
            source: ClipSource::Midi { notes },
        }
    }

    /// End position in seconds
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether the clip overlaps the half-open window `[t0, t1)`
    pub fn intersects(&self, t0: f64, t1: f64) -> bool {
        self.start < t1 && self.end() > t0
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.source, ClipSource::Audio { .. })
    }

    /// Source seconds consumed per timeline second, combining stretch and
    /// the pitch/duration-coupled resample factor.
    pub fn source_rate(&self) -> f64 {
        self.stretch * (self.pitch / 12.0).exp2()
    }

    /// Apply a time-stretch ratio as a view transform: the underlying
    /// samples are untouched and the effective duration scales by 1/ratio.
    pub fn time_stretch(&mut self, ratio: f64) {
        if ratio <= 0.0 {
            return;
        }
        self.stretch *= ratio;
        self.duration /= ratio;
        self.fade_in /= ratio;
        self.fade_out /= ratio;
    }

    /// Set the pitch shift in semitones. Duration is unchanged, which
    /// couples pitch to playback rate (documented approximation).
    pub fn pitch_shift(&mut self, semitones: f64) {
        self.pitch = semitones;
    }

    /// Trim `shift` seconds off the head, advancing the source offset
    pub fn trim_head(&mut self, shift: f64) {
        let shift = shift.clamp(0.0, self.duration);
        self.offset += shift * self.source_rate();
        self.start += shift;
        self.duration -= shift;
    }

    /// Truncate the clip to a new effective duration
    pub fn trim_tail(&mut self, new_duration: f64) {
        self.duration = new_duration.clamp(0.0, self.duration);
    }

    /// Gain-and-fade-adjusted sample at project time `t`, or `None` when
    /// `t` falls outside the clip or the clip has no audio. The mapping
    /// accounts for offset, stretch, pitch and reversal, resampling the
    /// source by linear interpolation.
    pub fn sample_at(&self, t: f64) -> Option<f32> {
        if t < self.start || t >= self.end() {
            return None;
        }
        let ClipSource::Audio { samples, sample_rate } = &self.source else {
            return None;
        };
        if samples.is_empty() {
            return None;
        }

        let local = t - self.start;
        let rate = self.source_rate();
        let mut src_secs = local * rate;
        if self.reversed {
            // Reflect within the covered source span, backing off one
            // sample so the reflected head stays inside the buffer.
            let span = self.duration * rate;
            src_secs = (span - src_secs - 1.0 / *sample_rate as f64).max(0.0);
        }

        let pos = (self.offset + src_secs) * *sample_rate as f64;
        if pos < 0.0 {
            return None;
        }
        let idx = pos as usize;
        if idx >= samples.len() {
            return None;
        }
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        let raw = a + (b - a) * frac;

        Some(raw * self.gain * self.fade_gain(local))
    }

    fn fade_gain(&self, local: f64) -> f32 {
        let mut g = 1.0f64;
        if self.fade_in > 0.0 && local < self.fade_in {
            g *= local / self.fade_in;
        }
        let remaining = self.duration - local;
        if self.fade_out > 0.0 && remaining < self.fade_out {
            g *= remaining / self.fade_out;
        }
        g as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_clip(len: usize) -> Clip {
        let samples: Vec<f32> = (0..len).map(|i| i as f32).collect();
        Clip::audio(ClipId(1), TrackId(1), 0.0, samples, 100)
    }

    #[test]
    fn sample_at_maps_offset_and_gain() {
        let mut clip = ramp_clip(200);
        clip.offset = 0.5; // 50 samples at 100 Hz
        clip.gain = 2.0;
        // t=0.1 -> source 0.6 s -> sample index 60
        assert_eq!(clip.sample_at(0.1), Some(120.0));
        assert_eq!(clip.sample_at(-0.1), None);
        assert_eq!(clip.sample_at(2.5), None);
    }

    #[test]
    fn stretch_roundtrip_restores_duration() {
        let mut clip = ramp_clip(200); // 2.0 s
        clip.time_stretch(0.5);
        assert!((clip.duration - 4.0).abs() < 1e-9);
        // Half speed: one second in covers half a source second
        assert_eq!(clip.sample_at(1.0), Some(50.0));
        clip.time_stretch(2.0);
        assert!((clip.duration - 2.0).abs() < 1e-9);
        assert!((clip.stretch - 1.0).abs() < 1e-9);
        assert_eq!(clip.sample_at(1.0), Some(100.0));
    }

    #[test]
    fn pitch_shift_keeps_duration() {
        let mut clip = ramp_clip(200);
        clip.pitch_shift(12.0);
        assert!((clip.duration - 2.0).abs() < 1e-9);
        // One octave up reads the source twice as fast
        assert_eq!(clip.sample_at(0.5), Some(100.0));
        // Past the end of the source the clip is silent
        assert_eq!(clip.sample_at(1.5), None);
    }

    #[test]
    fn reversed_reads_from_the_end() {
        let mut clip = ramp_clip(200);
        clip.reversed = true;
        let head = clip.sample_at(0.0).unwrap();
        assert!(head > 190.0);
    }

    #[test]
    fn fades_scale_toward_edges() {
        let mut clip = ramp_clip(200);
        clip.fade_in = 1.0;
        assert_eq!(clip.sample_at(0.0), Some(0.0));
        let mid = clip.sample_at(0.5).unwrap();
        // index 50 scaled by 0.5 fade
        assert!((mid - 25.0).abs() < 1.0);
    }

    #[test]
    fn midi_clip_renders_silent() {
        let clip = Clip::midi(ClipId(2), TrackId(1), 0.0, 4.0, vec![]);
        assert_eq!(clip.sample_at(1.0), None);
        assert!(clip.intersects(0.0, 1.0));
    }
}
