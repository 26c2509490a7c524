//! Onset detection and tempo-grid quantization math
//!
//! Pure sample-level analysis: the engine layers clip and project
//! bookkeeping on top of these functions.

/// Windows quieter than this never register as onsets
const MIN_ENERGY: f32 = 1e-4;

/// A planned move of the audio region starting at `onset` so that the
/// transient lands exactly on `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnsetShift {
    pub onset: usize,
    pub target: usize,
}

/// Detect transient onsets by comparing the energy of overlapping
/// analysis windows: a window whose energy exceeds the previous window's
/// by more than `threshold` flags an onset at the loudest sample inside
/// it. Onsets closer than one window to the previous one are suppressed.
pub fn detect_onsets(samples: &[f32], window: usize, hop: usize, threshold: f32) -> Vec<usize> {
    if samples.is_empty() || window == 0 || hop == 0 {
        return Vec::new();
    }

    let n_windows = samples.len().div_ceil(hop);
    let energy: Vec<f32> = (0..n_windows)
        .map(|i| {
            let start = i * hop;
            let end = (start + window).min(samples.len());
            let slice = &samples[start..end];
            slice.iter().map(|s| s * s).sum::<f32>() / slice.len() as f32
        })
        .collect();

    let mut onsets: Vec<usize> = Vec::new();
    for i in 1..n_windows {
        if energy[i] <= MIN_ENERGY || energy[i] <= energy[i - 1] * threshold {
            continue;
        }
        let start = i * hop;
        let end = (start + window).min(samples.len());
        let peak = (start..end)
            .max_by(|&a, &b| samples[a].abs().total_cmp(&samples[b].abs()))
            .unwrap_or(start);
        if onsets.last().is_none_or(|&last| peak >= last + window) {
            onsets.push(peak);
        }
    }
    onsets
}

/// For each onset, compute the nearest tempo-grid point and plan a shift
/// when the onset sits within `tolerance` samples of it. Onsets farther
/// out are left alone: ambiguous transients are never force-snapped.
pub fn grid_shifts(onsets: &[usize], grid_step: f64, tolerance: f64) -> Vec<OnsetShift> {
    if grid_step <= 0.0 {
        return Vec::new();
    }
    onsets
        .iter()
        .filter_map(|&onset| {
            let target = ((onset as f64 / grid_step).round() * grid_step).round() as usize;
            let diff = target.abs_diff(onset);
            (diff != 0 && diff as f64 <= tolerance).then_some(OnsetShift { onset, target })
        })
        .collect()
}

/// Rebuild a sample buffer with each onset-delimited region moved to its
/// planned target. Regions without a shift stay in place; overlapping
/// destinations are summed, gaps are left silent. The output length
/// equals the input length.
pub fn apply_shifts(samples: &[f32], onsets: &[usize], shifts: &[OnsetShift]) -> Vec<f32> {
    let mut out = vec![0.0f32; samples.len()];

    let head_end = onsets.first().copied().unwrap_or(samples.len());
    out[..head_end].copy_from_slice(&samples[..head_end]);

    for (k, &start) in onsets.iter().enumerate() {
        let end = onsets.get(k + 1).copied().unwrap_or(samples.len());
        let dest = shifts
            .iter()
            .find(|s| s.onset == start)
            .map_or(start, |s| s.target);
        for (i, &sample) in samples[start..end].iter().enumerate() {
            if let Some(slot) = out.get_mut(dest + i) {
                *slot += sample;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulses(len: usize, positions: &[usize]) -> Vec<f32> {
        let mut samples = vec![0.0f32; len];
        for &p in positions {
            samples[p] = 1.0;
        }
        samples
    }

    #[test]
    fn test_detect_onsets_finds_impulses() {
        let samples = impulses(2000, &[520, 1030]);
        assert_eq!(detect_onsets(&samples, 100, 50, 1.5), vec![520, 1030]);
    }

    #[test]
    fn test_detect_onsets_ignores_silence_and_steady_state() {
        assert!(detect_onsets(&vec![0.0; 2000], 100, 50, 1.5).is_empty());
        let steady = vec![0.5f32; 2000];
        assert!(detect_onsets(&steady, 100, 50, 1.5).is_empty());
    }

    #[test]
    fn test_grid_shifts_respects_tolerance() {
        // Grid every 500 samples, tolerance 125
        let shifts = grid_shifts(&[520, 1030, 1700], 500.0, 125.0);
        assert_eq!(
            shifts,
            vec![
                OnsetShift { onset: 520, target: 500 },
                OnsetShift { onset: 1030, target: 1000 },
            ]
        );
        // 1700 is 200 away from both 1500 and 2000: left untouched
        assert!(!shifts.iter().any(|s| s.onset == 1700));
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let samples = impulses(2000, &[520, 1030]);
        let onsets = detect_onsets(&samples, 100, 50, 1.5);
        let shifts = grid_shifts(&onsets, 500.0, 125.0);
        assert_eq!(shifts.len(), 2);

        let snapped = apply_shifts(&samples, &onsets, &shifts);
        let onsets2 = detect_onsets(&snapped, 100, 50, 1.5);
        assert_eq!(onsets2, vec![500, 1000]);
        assert!(grid_shifts(&onsets2, 500.0, 125.0).is_empty());
    }

    #[test]
    fn test_apply_shifts_preserves_unshifted_audio() {
        let samples = impulses(2000, &[520]);
        let out = apply_shifts(&samples, &[520], &[]);
        assert_eq!(out, samples);
    }
}
