//! Transport state and position tracking

use serde::{Deserialize, Serialize};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Recording,
}

/// How a finalized recording interacts with clips already in its range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    #[default]
    Overdub,
    Replace,
    Merge,
}

/// Transport controls, position and loop region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    /// Current position in seconds
    pub position: f64,
    pub loop_enabled: bool,
    /// Loop start in seconds
    pub loop_start: f64,
    /// Loop end in seconds
    pub loop_end: f64,
    pub record_mode: RecordMode,
    /// Position at which the current recording pass began
    pub record_started_at: Option<f64>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            position: 0.0,
            loop_enabled: false,
            loop_start: 0.0,
            loop_end: 0.0,
            record_mode: RecordMode::Overdub,
            record_started_at: None,
        }
    }
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.record_started_at = None;
    }

    /// Enter the recording state, remembering where the pass began
    pub fn record(&mut self) {
        self.state = TransportState::Recording;
        self.record_started_at = Some(self.position);
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self.state, TransportState::Playing | TransportState::Recording)
    }

    pub fn is_recording(&self) -> bool {
        self.state == TransportState::Recording
    }

    /// Seek to an absolute position in seconds
    pub fn seek(&mut self, position: f64) {
        self.position = position.max(0.0);
    }

    /// Advance position by elapsed seconds, wrapping at the loop end
    pub fn advance(&mut self, dt: f64) {
        self.position += dt.max(0.0);

        if self.loop_enabled && self.loop_end > self.loop_start && self.position >= self.loop_end {
            self.position = self.loop_start;
        }
    }

    pub fn set_loop(&mut self, start: f64, end: f64, enabled: bool) {
        self.loop_start = start.max(0.0);
        self.loop_end = end.max(self.loop_start);
        self.loop_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_monotonic_while_playing() {
        let mut t = Transport::new();
        t.play();
        let mut last = t.position;
        for _ in 0..100 {
            t.advance(0.01);
            assert!(t.position >= last);
            last = t.position;
        }
    }

    #[test]
    fn loop_wraps_to_start() {
        let mut t = Transport::new();
        t.set_loop(1.0, 2.0, true);
        t.play();
        t.seek(1.95);
        t.advance(0.1);
        assert!((t.position - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_loop_does_not_wrap() {
        let mut t = Transport::new();
        t.set_loop(1.0, 2.0, false);
        t.play();
        t.seek(1.95);
        t.advance(0.1);
        assert!(t.position > 2.0);
    }

    #[test]
    fn record_remembers_start_position() {
        let mut t = Transport::new();
        t.seek(3.5);
        t.record();
        assert_eq!(t.record_started_at, Some(3.5));
        t.stop();
        assert_eq!(t.record_started_at, None);
    }
}
