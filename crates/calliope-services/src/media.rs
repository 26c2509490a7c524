//! WAV import/export and sample-rate conversion

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use thiserror::Error;
use tracing::info;

use crate::mixer::MasterBuffer;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Empty audio file: {0}")]
    Empty(String),
}

/// Read a WAV file to mono f32. Returns (samples, sample_rate).
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32), MediaError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };
    if samples.is_empty() {
        return Err(MediaError::Empty(path.display().to_string()));
    }

    let mono = to_mono(&samples, spec.channels as usize);
    info!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        frames = mono.len(),
        "Read WAV"
    );
    Ok((mono, spec.sample_rate))
}

/// Convert interleaved samples to mono by averaging channels
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio with a windowed-sinc resampler; a no-op when the
/// rates already match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, MediaError> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| MediaError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| MediaError::Resample(e.to_string()))?;

    Ok(output.into_iter().flatten().collect())
}

/// Write mono f32 samples as 16-bit PCM
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), MediaError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    info!(path = %path.display(), frames = samples.len(), "Wrote WAV");
    Ok(())
}

/// Write interleaved stereo f32 frames as 16-bit PCM
pub fn write_wav_stereo(path: &Path, interleaved: &[f32], sample_rate: u32) -> Result<(), MediaError> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in interleaved {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    info!(path = %path.display(), frames = interleaved.len() / 2, "Wrote WAV");
    Ok(())
}

/// Bounce a sequence of rendered windows to a stereo WAV file
pub fn write_bounce(path: &Path, windows: &[MasterBuffer], sample_rate: u32) -> Result<(), MediaError> {
    let interleaved: Vec<f32> = windows.iter().flat_map(MasterBuffer::interleaved).collect();
    write_wav_stereo(path, &interleaved, sample_rate)
}
