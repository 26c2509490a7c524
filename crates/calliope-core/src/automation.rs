//! Automation lanes: time-varying overrides for mix and effect parameters

use serde::{Deserialize, Serialize};

/// Interpolation curve between an automation point and the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutomationPoint {
    /// Time in seconds (project-relative)
    pub time: f64,
    pub value: f32,
    #[serde(default)]
    pub curve: CurveKind,
}

impl AutomationPoint {
    pub fn new(time: f64, value: f32, curve: CurveKind) -> Self {
        Self { time, value, curve }
    }
}

/// A time-ordered list of points overriding one parameter.
///
/// Parameter names are `"volume"`, `"pan"`, or `"fx:<slot>:<param>"`
/// addressing a parameter of the effect unit in chain slot `<slot>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLane {
    pub parameter: String,
    /// Points strictly increasing in time
    pub points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            points: Vec::new(),
        }
    }

    /// Insert a point keeping times strictly increasing; a point at an
    /// existing time replaces it.
    pub fn add_point(&mut self, point: AutomationPoint) {
        match self.points.iter().position(|p| p.time >= point.time) {
            Some(idx) if self.points[idx].time == point.time => self.points[idx] = point,
            Some(idx) => self.points.insert(idx, point),
            None => self.points.push(point),
        }
    }

    /// Value at time `t`: the boundary value outside the points, the
    /// curve-shaped interpolation between the bracketing pair inside.
    /// The outgoing point's curve shapes its segment.
    pub fn value_at(&self, t: f64) -> f32 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        if t <= first.time {
            return first.value;
        }

        let mut prev = first;
        for point in &self.points[1..] {
            if t < point.time {
                let u = ((t - prev.time) / (point.time - prev.time)) as f32;
                let shaped = match prev.curve {
                    CurveKind::Linear => u,
                    CurveKind::Exponential => u * u,
                    CurveKind::Logarithmic => u.sqrt(),
                };
                return prev.value + (point.value - prev.value) * shaped;
            }
            prev = point;
        }
        prev.value
    }
}
