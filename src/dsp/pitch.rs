use std::time::Duration;

use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;
use serde::{Deserialize, Serialize};

use crate::util;

/// McLeod power threshold. The RMS gate has already rejected quiet frames,
/// so this only needs to keep numerical noise out.
const MCLEOD_POWER_THRESHOLD: f64 = 0.2;

/// McLeod clarity threshold (0.0-1.0).
const MCLEOD_CLARITY_THRESHOLD: f64 = 0.6;

/// Which pitch detection algorithm runs on each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Time-domain autocorrelation with early exit on the first strong,
    /// still-improving peak.
    #[default]
    Autocorrelation,
    /// McLeod Pitch Method from the `pitch-detection` crate.
    McLeod,
}

/// Configuration for per-frame pitch detection.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub kind: DetectorKind,

    /// Silence gate. Frames with RMS below this never reach the detector.
    pub min_rms: f32,

    /// A lag only counts as a candidate period once its correlation score
    /// is above this.
    pub good_enough_correlation: f32,

    /// The winning lag must at least reach this score, otherwise the frame
    /// is reported as unpitched.
    pub min_correlation: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Autocorrelation,
            min_rms: 0.01,
            good_enough_correlation: 0.9,
            min_correlation: 0.01,
        }
    }
}

/// The detector's view of one frame.
///
/// `frequency_hz == 0.0` means no pitch (silence or an unvoiced frame).
/// `confidence` is the detector's own score for the winning period; the
/// confidence consumers should act on is the one on `NoteReading`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    pub confidence: f32,
    /// Frame loudness (linear RMS).
    pub rms: f32,
    /// Position of the frame on the session's audio clock.
    pub timestamp: Duration,
}

impl PitchEstimate {
    pub fn unpitched(rms: f32, timestamp: Duration) -> Self {
        Self {
            frequency_hz: 0.0,
            confidence: 0.0,
            rms,
            timestamp,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Estimate the fundamental frequency and loudness of one frame.
pub fn detect_pitch(
    frame: &[f32],
    sample_rate: u32,
    timestamp: Duration,
    config: &DetectorConfig,
) -> PitchEstimate {
    let rms = util::rms(frame);
    if rms < config.min_rms {
        return PitchEstimate::unpitched(rms, timestamp);
    }

    let detected = match config.kind {
        DetectorKind::Autocorrelation => autocorrelate(frame, sample_rate, config),
        DetectorKind::McLeod => mcleod(frame, sample_rate),
    };

    match detected {
        Some((frequency_hz, confidence)) => PitchEstimate {
            frequency_hz,
            confidence: confidence.clamp(0.0, 1.0),
            rms,
            timestamp,
        },
        None => PitchEstimate::unpitched(rms, timestamp),
    }
}

/// Time-domain autocorrelation over lags 1..L/2.
///
/// For each lag the mean absolute difference between the first half of the
/// frame and its shifted copy is turned into a score where 1.0 means the
/// frame repeats perfectly at that lag.
///
/// The scan keeps the best lag whose score is above the "good enough"
/// threshold *and* still rising, and stops at the first lag after that which
/// no longer qualifies. On a voiced frame the score falls from lag 1, bottoms
/// out around half a period, then climbs back toward the first full period;
/// stopping there picks the fundamental rather than a later multiple of it.
///
/// Returns (frequency, score) or None if no lag was good enough.
fn autocorrelate(frame: &[f32], sample_rate: u32, config: &DetectorConfig) -> Option<(f32, f32)> {
    let half = frame.len() / 2;
    if half < 2 {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_correlation = 0.0_f32;
    let mut found_good = false;
    let mut last_correlation = 1.0_f32;

    for lag in 1..half {
        let diff: f32 = frame[..half]
            .iter()
            .zip(&frame[lag..lag + half])
            .map(|(a, b)| (a - b).abs())
            .sum();
        let correlation = 1.0 - diff / half as f32;

        if correlation > config.good_enough_correlation && correlation > last_correlation {
            found_good = true;
            if correlation > best_correlation {
                best_correlation = correlation;
                best_lag = lag;
            }
        } else if found_good {
            break;
        }
        last_correlation = correlation;
    }

    if best_lag > 0 && best_correlation > config.min_correlation {
        Some((sample_rate as f32 / best_lag as f32, best_correlation))
    } else {
        None
    }
}

/// McLeod Pitch Method via the `pitch-detection` crate.
fn mcleod(frame: &[f32], sample_rate: u32) -> Option<(f32, f32)> {
    let size = frame.len();
    let signal: Vec<f64> = frame.iter().map(|&s| s as f64).collect();

    let mut detector = McLeodDetector::new(size, size / 2);
    detector
        .get_pitch(
            &signal,
            sample_rate as usize,
            MCLEOD_POWER_THRESHOLD,
            MCLEOD_CLARITY_THRESHOLD,
        )
        .filter(|p| p.frequency.is_finite() && p.frequency > 0.0)
        .map(|p| (p.frequency as f32, p.clarity as f32))
}
