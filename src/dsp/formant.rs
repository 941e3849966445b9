use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use super::windowing;
use crate::util;

/// Frames quieter than this carry no usable spectral shape.
const MIN_RMS: f32 = 0.01;

/// Width of the moving average that turns the harmonic comb into an envelope.
const ENVELOPE_WIDTH_HZ: f32 = 150.0;

const F1_RANGE_HZ: (f32, f32) = (250.0, 1000.0);
const F2_RANGE_HZ: (f32, f32) = (800.0, 3000.0);

/// Minimum spacing between F1 and F2.
const MIN_F1_F2_GAP_HZ: f32 = 200.0;

/// First two vocal-tract resonances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Formants {
    pub f1_hz: f32,
    pub f2_hz: f32,
}

/// Coarse F1/F2 estimate from one frame.
///
/// 1. Hann window, FFT, magnitude spectrum
/// 2. Moving average over ~150 Hz to smooth away individual harmonics
/// 3. F1 = strongest envelope bin in 250-1000 Hz
/// 4. F2 = strongest envelope bin in 800-3000 Hz, at least 200 Hz above F1
///
/// This is peak picking, not LPC; it is good enough to separate broad vowel
/// classes. Returns None for quiet frames or a flat spectrum.
pub fn estimate_formants(frame: &[f32], sample_rate: u32) -> Option<Formants> {
    if frame.len() < 64 || util::rms(frame) < MIN_RMS {
        return None;
    }

    let fft_size = frame.len().next_power_of_two();
    let windowed = windowing::hanning(frame);

    let mut buf: Vec<Complex<f32>> = windowed.iter().map(|&s| Complex::new(s, 0.0)).collect();
    buf.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(fft_size).process(&mut buf);

    let half = fft_size / 2;
    let magnitude: Vec<f32> = buf[..half].iter().map(|c| c.norm()).collect();

    let bin_hz = sample_rate as f32 / fft_size as f32;
    let radius = ((ENVELOPE_WIDTH_HZ / bin_hz / 2.0).round() as usize).max(1);
    let envelope = moving_average(&magnitude, radius);

    let f1_bin = strongest_bin(&envelope, bin_hz, F1_RANGE_HZ.0, F1_RANGE_HZ.1)?;
    let f1_hz = f1_bin as f32 * bin_hz;

    let f2_low = F2_RANGE_HZ.0.max(f1_hz + MIN_F1_F2_GAP_HZ);
    let f2_bin = strongest_bin(&envelope, bin_hz, f2_low, F2_RANGE_HZ.1)?;

    Some(Formants {
        f1_hz,
        f2_hz: f2_bin as f32 * bin_hz,
    })
}

fn moving_average(values: &[f32], radius: usize) -> Vec<f32> {
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(radius);
            let end = (i + radius + 1).min(values.len());
            values[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Index of the largest value whose frequency lies in [low_hz, high_hz].
fn strongest_bin(envelope: &[f32], bin_hz: f32, low_hz: f32, high_hz: f32) -> Option<usize> {
    let start = (low_hz / bin_hz).ceil() as usize;
    let end = ((high_hz / bin_hz).floor() as usize).min(envelope.len().saturating_sub(1));
    if start > end {
        return None;
    }

    let (idx, &peak) = envelope[start..=end]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;

    if peak > 0.0 {
        Some(start + idx)
    } else {
        None
    }
}
