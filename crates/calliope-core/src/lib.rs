//! calliope-core: Domain types for the calliope multitrack engine

pub mod analysis;
mod automation;
mod clip;
mod error;
mod project;
mod track;
mod transport;

pub use analysis::{OnsetShift, apply_shifts, detect_onsets, grid_shifts};
pub use automation::{AutomationLane, AutomationPoint, CurveKind};
pub use clip::{Clip, ClipId, ClipSource, MidiNote};
pub use error::{EngineError, Result};
pub use project::Project;
pub use track::{Track, TrackId, TrackKind};
pub use transport::{RecordMode, Transport, TransportState};
