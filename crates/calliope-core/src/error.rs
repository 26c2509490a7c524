//! Error types for calliope

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Audio error: {0}")]
    Audio(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Track not found: {0}")]
    TrackNotFound(u64),
    #[error("Clip not found: {0}")]
    ClipNotFound(u64),
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),
    #[error("No armed tracks")]
    NoArmedTracks,
}

pub type Result<T> = std::result::Result<T, EngineError>;
