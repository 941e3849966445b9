/// Level (dBFS) that maps to an empty volume scale.
pub const VOLUME_FLOOR_DB: f32 = -60.0;

/// RMS of a sample buffer (linear, not dB).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert a linear amplitude to dB relative to full scale.
/// Returns -infinity for zero.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Compute peak amplitude in dB (relative to full scale).
/// Returns -infinity for all-zero input.
pub fn peak_db(samples: &[f32]) -> f32 {
    let peak = samples.iter().fold(0.0_f32, |max, &s| max.max(s.abs()));
    amplitude_to_db(peak)
}

/// Compute RMS level in dB (relative to full scale).
/// Returns -infinity for all-zero or empty input.
pub fn rms_db(samples: &[f32]) -> f32 {
    amplitude_to_db(rms(samples))
}

/// Map an RMS amplitude onto the 0-100 volume scale.
///
/// -60 dBFS and below is 0, full scale is 100, linear in dB in between.
pub fn volume_percent(rms: f32) -> f32 {
    let db = amplitude_to_db(rms);
    if !db.is_finite() {
        return 0.0;
    }
    ((db - VOLUME_FLOOR_DB) / -VOLUME_FLOOR_DB * 100.0).clamp(0.0, 100.0)
}

/// Mean and population standard deviation. `None` for an empty slice.
pub fn mean_std(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f32>() / n;
    Some((mean, variance.sqrt()))
}
