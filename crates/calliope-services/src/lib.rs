//! calliope-services: engine, effects, mixing and the control surface

pub mod audio_effects;
pub mod audio_io;
pub mod control;
pub mod engine;
pub mod media;
pub mod mixer;
pub mod recorder;

pub use audio_effects::{
    AudioEffect, CompressorEffect, DelayEffect, DistortionEffect, EffectChain, EffectDescription,
    EffectKind, EffectParam, EqEffect, HostedPluginEffect, PluginCatalog, PluginDescriptor,
    PluginError, PluginKind, ReverbEffect, StereoChain, create_effect,
};
pub use audio_io::{AudioOutputError, RealtimeOutputStream};
pub use control::{ChainView, Command, EngineState, Event};
pub use engine::{Engine, EngineHandle};
pub use media::MediaError;
pub use mixer::{MasterBuffer, TrackChains, render_window};
pub use recorder::{FinalizedClip, Recorder};
