//! Native effect units: EQ, compressor, reverb, delay, distortion

use std::fmt;

use fundsp::hacker::*;

use super::{AudioEffect, EffectKind, EffectParam};

/// Three-band EQ: low shelf, mid bell at the geometric mean of the two
/// corner frequencies, high shelf.
pub struct EqEffect {
    low_gain_db: f32,
    mid_gain_db: f32,
    high_gain_db: f32,
    low_freq: f32,
    high_freq: f32,
    sample_rate: f32,
    low: An<FixedSvf<f64, LowshelfMode<f64>>>,
    mid: An<FixedSvf<f64, BellMode<f64>>>,
    high: An<FixedSvf<f64, HighshelfMode<f64>>>,
    enabled: bool,
}

impl EqEffect {
    pub fn new(sample_rate: f32) -> Self {
        let mut eq = Self {
            low_gain_db: 0.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
            low_freq: 250.0,
            high_freq: 4000.0,
            sample_rate,
            low: lowshelf_hz(250.0, 0.707, 1.0),
            mid: bell_hz(1000.0, 0.707, 1.0),
            high: highshelf_hz(4000.0, 0.707, 1.0),
            enabled: true,
        };
        eq.rebuild();
        eq
    }

    fn rebuild(&mut self) {
        let mid_freq = (self.low_freq * self.high_freq).sqrt();
        self.low = lowshelf_hz(self.low_freq, 0.707, db_amp(self.low_gain_db) as f32);
        self.mid = bell_hz(mid_freq, 0.707, db_amp(self.mid_gain_db) as f32);
        self.high = highshelf_hz(self.high_freq, 0.707, db_amp(self.high_gain_db) as f32);
        self.low.set_sample_rate(self.sample_rate as f64);
        self.mid.set_sample_rate(self.sample_rate as f64);
        self.high.set_sample_rate(self.sample_rate as f64);
    }
}

impl fmt::Debug for EqEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqEffect")
            .field("low_gain_db", &self.low_gain_db)
            .field("mid_gain_db", &self.mid_gain_db)
            .field("high_gain_db", &self.high_gain_db)
            .field("low_freq", &self.low_freq)
            .field("high_freq", &self.high_freq)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AudioEffect for EqEffect {
    fn name(&self) -> &str { "EQ" }
    fn kind(&self) -> EffectKind { EffectKind::Eq }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let mut frame = Frame::from([*sample]);
            frame = self.low.tick(&frame);
            frame = self.mid.tick(&frame);
            frame = self.high.tick(&frame);
            *sample = frame[0];
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "low_gain" => self.low_gain_db = value.clamp(-24.0, 24.0),
            "mid_gain" => self.mid_gain_db = value.clamp(-24.0, 24.0),
            "high_gain" => self.high_gain_db = value.clamp(-24.0, 24.0),
            "low_freq" => self.low_freq = value.clamp(20.0, 20_000.0),
            "high_freq" => self.high_freq = value.clamp(20.0, 20_000.0),
            _ => return,
        }
        self.rebuild();
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("low_gain", self.low_gain_db, -24.0, 24.0, "dB"),
            EffectParam::new("mid_gain", self.mid_gain_db, -24.0, 24.0, "dB"),
            EffectParam::new("high_gain", self.high_gain_db, -24.0, 24.0, "dB"),
            EffectParam::new("low_freq", self.low_freq, 20.0, 20_000.0, "Hz"),
            EffectParam::new("high_freq", self.high_freq, 20.0, 20_000.0, "Hz"),
        ]
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.rebuild();
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

/// Feed-forward compressor with a dB-domain envelope follower.
///
/// The envelope rises toward the instantaneous level with the attack
/// time constant while the level exceeds the threshold and decays with
/// the release constant otherwise; gain reduction above threshold is
/// `(envelope - threshold) * (1 - 1/ratio)`.
#[derive(Debug)]
pub struct CompressorEffect {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    makeup_db: f32,
    envelope_db: f32,
    sample_rate: f32,
    enabled: bool,
}

const ENVELOPE_FLOOR_DB: f32 = -90.0;

impl CompressorEffect {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            attack: 0.01,
            release: 0.1,
            makeup_db: 0.0,
            envelope_db: ENVELOPE_FLOOR_DB,
            sample_rate,
            enabled: true,
        }
    }
}

impl AudioEffect for CompressorEffect {
    fn name(&self) -> &str { "Compressor" }
    fn kind(&self) -> EffectKind { EffectKind::Compressor }

    fn process(&mut self, samples: &mut [f32]) {
        let attack_coeff = 1.0 - (-1.0 / (self.attack * self.sample_rate)).exp();
        let release_coeff = 1.0 - (-1.0 / (self.release * self.sample_rate)).exp();
        let slope = 1.0 - 1.0 / self.ratio;

        for sample in samples.iter_mut() {
            let level_db = 20.0 * sample.abs().max(1e-5).log10();
            let coeff = if level_db > self.threshold_db {
                attack_coeff
            } else {
                release_coeff
            };
            self.envelope_db += (level_db - self.envelope_db) * coeff;

            let reduction = if self.envelope_db > self.threshold_db {
                (self.envelope_db - self.threshold_db) * slope
            } else {
                0.0
            };
            *sample *= 10f32.powf((self.makeup_db - reduction) / 20.0);
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "threshold" => self.threshold_db = value.clamp(-60.0, 0.0),
            "ratio" => self.ratio = value.clamp(1.0, 20.0),
            "attack" => self.attack = value.clamp(0.001, 1.0),
            "release" => self.release = value.clamp(0.001, 1.0),
            "makeup" => self.makeup_db = value.clamp(-24.0, 24.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("threshold", self.threshold_db, -60.0, 0.0, "dB"),
            EffectParam::new("ratio", self.ratio, 1.0, 20.0, ""),
            EffectParam::new("attack", self.attack, 0.001, 1.0, "s"),
            EffectParam::new("release", self.release, 0.001, 1.0, "s"),
            EffectParam::new("makeup", self.makeup_db, -24.0, 24.0, "dB"),
        ]
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn reset(&mut self) {
        self.envelope_db = ENVELOPE_FLOOR_DB;
    }
}

/// Comb-filter reverb: four fixed delay taps tens of milliseconds apart
/// scaled by room size, with damping-controlled feedback.
pub struct ReverbEffect {
    room_size: f32,
    damping: f32,
    wet: f32,
    delays: Vec<Vec<f32>>,
    positions: Vec<usize>,
    sample_rate: f32,
    enabled: bool,
}

impl ReverbEffect {
    pub fn new(room_size: f32, damping: f32, wet: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            wet: wet.clamp(0.0, 1.0),
            delays: Vec::new(),
            positions: Vec::new(),
            sample_rate,
            enabled: true,
        };
        effect.rebuild_delays();
        effect
    }

    fn rebuild_delays(&mut self) {
        let base_delay = self.room_size * 50.0 + 10.0;
        let delay_times_ms = [
            base_delay,
            base_delay * 1.13,
            base_delay * 1.27,
            base_delay * 1.41,
        ];

        self.delays = delay_times_ms
            .iter()
            .map(|&ms| {
                let samples = (ms * self.sample_rate / 1000.0) as usize;
                vec![0.0; Ord::max(samples, 1)]
            })
            .collect();
        self.positions = vec![0; self.delays.len()];
    }
}

impl fmt::Debug for ReverbEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverbEffect")
            .field("room_size", &self.room_size)
            .field("damping", &self.damping)
            .field("wet", &self.wet)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AudioEffect for ReverbEffect {
    fn name(&self) -> &str { "Reverb" }
    fn kind(&self) -> EffectKind { EffectKind::Reverb }

    fn process(&mut self, samples: &mut [f32]) {
        let feedback = 0.7 * (1.0 - self.damping * 0.4);

        for sample in samples.iter_mut() {
            let dry = *sample;
            let mut wet = 0.0;

            for (i, delay_buf) in self.delays.iter_mut().enumerate() {
                let pos = self.positions[i];
                let delayed = delay_buf[pos];
                wet += delayed;
                delay_buf[pos] = dry + delayed * feedback;
                self.positions[i] = (pos + 1) % delay_buf.len();
            }

            wet /= self.delays.len() as f32;
            *sample = dry * (1.0 - self.wet) + wet * self.wet;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "room_size" => {
                self.room_size = value.clamp(0.0, 1.0);
                self.rebuild_delays();
            }
            "damping" => self.damping = value.clamp(0.0, 1.0),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("room_size", self.room_size, 0.0, 1.0, ""),
            EffectParam::new("damping", self.damping, 0.0, 1.0, ""),
            EffectParam::new("wet", self.wet, 0.0, 1.0, ""),
        ]
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.rebuild_delays();
    }

    fn reset(&mut self) {
        for buf in &mut self.delays {
            buf.fill(0.0);
        }
    }
}

/// Feedback delay over a circular buffer; the wet signal is added to the
/// dry signal rather than crossfaded.
pub struct DelayEffect {
    delay_time: f32,
    feedback: f32,
    wet: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
    enabled: bool,
}

const MAX_DELAY_SECS: f32 = 2.0;

impl DelayEffect {
    pub fn new(delay_time: f32, feedback: f32, wet: f32, sample_rate: f32) -> Self {
        let max_samples = (MAX_DELAY_SECS * sample_rate) as usize;
        Self {
            delay_time: delay_time.clamp(0.001, MAX_DELAY_SECS),
            feedback: feedback.clamp(0.0, 0.95),
            wet: wet.clamp(0.0, 1.0),
            buffer: vec![0.0; max_samples],
            write_pos: 0,
            sample_rate,
            enabled: true,
        }
    }
}

impl fmt::Debug for DelayEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayEffect")
            .field("delay_time", &self.delay_time)
            .field("feedback", &self.feedback)
            .field("wet", &self.wet)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AudioEffect for DelayEffect {
    fn name(&self) -> &str { "Delay" }
    fn kind(&self) -> EffectKind { EffectKind::Delay }

    fn process(&mut self, samples: &mut [f32]) {
        let delay_samples = (self.delay_time * self.sample_rate) as usize;
        let delay_samples = delay_samples.clamp(1, self.buffer.len() - 1);

        for sample in samples.iter_mut() {
            let read_pos = (self.write_pos + self.buffer.len() - delay_samples) % self.buffer.len();
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = *sample + delayed * self.feedback;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
            *sample += delayed * self.wet;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "delay_time" => self.delay_time = value.clamp(0.001, MAX_DELAY_SECS),
            "feedback" => self.feedback = value.clamp(0.0, 0.95),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("delay_time", self.delay_time, 0.001, MAX_DELAY_SECS, "s"),
            EffectParam::new("feedback", self.feedback, 0.0, 0.95, ""),
            EffectParam::new("wet", self.wet, 0.0, 1.0, ""),
        ]
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.buffer = vec![0.0; (MAX_DELAY_SECS * sample_rate) as usize];
        self.write_pos = 0;
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Drive into an exponential soft knee, then a one-pole tone low-pass.
#[derive(Debug)]
pub struct DistortionEffect {
    drive: f32,
    tone: f32,
    last: f32,
    enabled: bool,
}

impl DistortionEffect {
    pub fn new(drive: f32, tone: f32) -> Self {
        Self {
            drive: drive.clamp(1.0, 20.0),
            tone: tone.clamp(0.0, 1.0),
            last: 0.0,
            enabled: true,
        }
    }
}

impl AudioEffect for DistortionEffect {
    fn name(&self) -> &str { "Distortion" }
    fn kind(&self) -> EffectKind { EffectKind::Distortion }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let driven = *sample * self.drive;
            let clipped = if driven.abs() > 1.0 {
                driven.signum() * (2.0 - (1.0 - driven.abs()).exp())
            } else {
                driven
            };
            let out = clipped * (1.0 - self.tone) + self.last * self.tone;
            self.last = out;
            *sample = out;
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "drive" => self.drive = value.clamp(1.0, 20.0),
            "tone" => self.tone = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn get_params(&self) -> Vec<EffectParam> {
        vec![
            EffectParam::new("drive", self.drive, 1.0, 20.0, ""),
            EffectParam::new("tone", self.tone, 0.0, 1.0, ""),
        ]
    }

    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
    fn is_enabled(&self) -> bool { self.enabled }

    fn reset(&mut self) {
        self.last = 0.0;
    }
}
