//! Device playback of rendered master windows via cpal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::{error, info};

use crate::mixer::MasterBuffer;

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Realtime output stream fed by the engine's audio sink channel.
///
/// The device callback drains rendered windows as they arrive and plays
/// silence on underrun; it never blocks on the engine. Windows are
/// played at the device rate, so the project should be created with the
/// device's sample rate.
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    pub fn start(rx: Receiver<MasterBuffer>) -> Result<Self, AudioOutputError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let config: StreamConfig = supported_config.into();

        // Frames left over from the previous callback
        let mut pending: Vec<(f32, f32)> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                        return;
                    }

                    let frames_needed = data.len() / channels;
                    while pending.len() < frames_needed {
                        match rx.try_recv() {
                            Ok(window) => {
                                pending.extend(window.left.iter().zip(&window.right).map(|(&l, &r)| (l, r)));
                            }
                            Err(_) => break,
                        }
                    }

                    let mut frames = pending.drain(..pending.len().min(frames_needed));
                    for frame in data.chunks_mut(channels) {
                        let (l, r) = frames.next().unwrap_or((0.0, 0.0));
                        for (ch, out) in frame.iter_mut().enumerate() {
                            *out = match ch {
                                0 => l,
                                1 => r,
                                _ => (l + r) * 0.5,
                            };
                        }
                    }
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(sample_rate, channels, "Started realtime output stream");

        Ok(Self { stop_flag, _stream: stream })
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
