use serde::{Deserialize, Serialize};

use super::history::HistorySnapshot;
use super::session_stats::SessionSummary;
use crate::config::{
    AnalysisConfig, MIN_STABILITY_SAMPLES, MIN_VIBRATO_CYCLES, MIN_VIBRATO_SAMPLES,
};
use crate::dsp::formant::Formants;
use crate::dsp::note;
use crate::util;

/// Below these, a "formant" is more likely the fundamental or noise.
const MIN_F1_HZ: f32 = 200.0;
const MIN_F2_HZ: f32 = 500.0;

/// Boundaries between the "low" and "high" halves of each formant.
const F1_SPLIT_HZ: f32 = 500.0;
const F2_SPLIT_HZ: f32 = 1500.0;

/// Everything the UI layer can ask about the recent signal, recomputed from
/// scratch on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocalMetrics {
    pub pitch_range: Option<PitchRange>,
    pub vibrato: Vibrato,
    pub stability: Stability,
    pub volume: VolumeStats,
    pub formants: FormantReport,
    pub session: SessionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchRange {
    pub lowest_hz: f32,
    pub highest_hz: f32,
    pub lowest_note: String,
    pub highest_note: String,
    pub semitones: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vibrato {
    pub detected: bool,
    pub rate_hz: f32,
    pub depth_cents: f32,
    /// Complete peak/trough cycles seen in the history.
    pub cycles: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    /// False when there were too few voiced samples; every number is 0 then.
    pub available: bool,
    /// 0-100, higher is steadier.
    pub consistency: f32,
    pub avg_deviation_cents: f32,
    pub mean_hz: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub current: f32,
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub dynamic_range: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vowel {
    Ee,
    Ah,
    Oh,
    Oo,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormantReport {
    pub f1_hz: Option<f32>,
    pub f2_hz: Option<f32>,
    pub vowel: Vowel,
}

impl Default for FormantReport {
    fn default() -> Self {
        Self {
            f1_hz: None,
            f2_hz: None,
            vowel: Vowel::NotApplicable,
        }
    }
}

/// Compute a full metrics snapshot.
///
/// `tick_secs` is the time between history entries, used to turn sample
/// counts into rates.
pub fn analyze(
    snapshot: &HistorySnapshot,
    config: &AnalysisConfig,
    tick_secs: f32,
    formants: Option<Formants>,
    session: SessionSummary,
) -> VocalMetrics {
    let voiced = snapshot.voiced_frequencies();

    VocalMetrics {
        pitch_range: pitch_range(&voiced),
        vibrato: vibrato(&voiced, snapshot.frequencies.len(), config, tick_secs),
        stability: stability(&voiced, config.stability_min_samples),
        volume: volume_stats(snapshot),
        formants: formant_report(formants),
        session,
    }
}

/// Lowest and highest voiced pitch, or None if nothing was voiced.
pub fn pitch_range(voiced: &[f32]) -> Option<PitchRange> {
    let lowest = voiced.iter().copied().fold(f32::INFINITY, f32::min);
    let highest = voiced.iter().copied().fold(0.0_f32, f32::max);
    if voiced.is_empty() || !lowest.is_finite() || lowest <= 0.0 {
        return None;
    }

    Some(PitchRange {
        lowest_hz: lowest,
        highest_hz: highest,
        lowest_note: note::note_position(lowest).label(),
        highest_note: note::note_position(highest).label(),
        semitones: 12.0 * (highest / lowest).log2(),
    })
}

/// How steady the pitch is.
///
/// deviation (cents) = std / mean · 1200, consistency = 100 - deviation / 2,
/// floored at 0. With fewer than `min_samples` voiced values the result is
/// all zeros and `available == false` rather than a misleading score.
pub fn stability(voiced: &[f32], min_samples: usize) -> Stability {
    if voiced.len() < min_samples.max(MIN_STABILITY_SAMPLES) {
        return Stability::default();
    }
    let Some((mean, std)) = util::mean_std(voiced) else {
        return Stability::default();
    };
    if mean <= 0.0 {
        return Stability::default();
    }

    let avg_deviation_cents = std / mean * 1200.0;
    Stability {
        available: true,
        consistency: (100.0 - avg_deviation_cents * 0.5).max(0.0),
        avg_deviation_cents,
        mean_hz: mean,
    }
}

/// Count vibrato cycles in the voiced frequency sequence.
///
/// A sample is a peak when it rose from the previous one, did not rise into
/// the next one, and the larger of the two changes exceeds the threshold;
/// troughs mirror that. Each matched peak/trough pair is one cycle, and
/// vibrato is only reported once enough cycles are present.
///
/// The rate divides cycles by the elapsed buffer duration, `buffer_len`
/// history entries including unvoiced ones, so gaps slow the reported rate.
pub fn vibrato(
    voiced: &[f32],
    buffer_len: usize,
    config: &AnalysisConfig,
    tick_secs: f32,
) -> Vibrato {
    if voiced.len() < config.vibrato_min_samples.max(MIN_VIBRATO_SAMPLES) {
        return Vibrato::default();
    }

    let threshold = config.vibrato_threshold_hz;
    let mut peaks = Vec::new();
    let mut troughs = Vec::new();

    for w in voiced.windows(3) {
        let (prev, cur, next) = (w[0], w[1], w[2]);
        if cur > prev && cur >= next && (cur - prev).max(cur - next) > threshold {
            peaks.push(cur);
        } else if cur < prev && cur <= next && (prev - cur).max(next - cur) > threshold {
            troughs.push(cur);
        }
    }

    let cycles = peaks.len().min(troughs.len());
    if cycles < config.vibrato_min_cycles.max(MIN_VIBRATO_CYCLES) {
        return Vibrato {
            cycles,
            ..Vibrato::default()
        };
    }

    let duration_secs = buffer_len.max(voiced.len()) as f32 * tick_secs;
    let mean_peak = peaks.iter().sum::<f32>() / peaks.len() as f32;
    let mean_trough = troughs.iter().sum::<f32>() / troughs.len() as f32;

    let rate_hz = if duration_secs > 0.0 {
        cycles as f32 / duration_secs
    } else {
        0.0
    };
    let depth_cents = if mean_trough > 0.0 {
        1200.0 * (mean_peak / mean_trough).log2() / 2.0
    } else {
        0.0
    };

    Vibrato {
        detected: true,
        rate_hz,
        depth_cents,
        cycles,
    }
}

/// Current, average and extreme volume over audible entries.
pub fn volume_stats(snapshot: &HistorySnapshot) -> VolumeStats {
    let current = snapshot.volumes.last().copied().unwrap_or(0.0);
    let audible = snapshot.audible_volumes();
    if audible.is_empty() {
        return VolumeStats {
            current,
            ..VolumeStats::default()
        };
    }

    let min = audible.iter().copied().fold(f32::INFINITY, f32::min);
    let max = audible.iter().copied().fold(0.0_f32, f32::max);
    VolumeStats {
        current,
        average: audible.iter().sum::<f32>() / audible.len() as f32,
        min,
        max,
        dynamic_range: max - min,
    }
}

/// Bucket an (F1, F2) pair into a coarse vowel class.
pub fn classify_vowel(f1_hz: f32, f2_hz: f32) -> Vowel {
    if !(f1_hz >= MIN_F1_HZ && f2_hz >= MIN_F2_HZ) {
        return Vowel::NotApplicable;
    }
    match (f1_hz >= F1_SPLIT_HZ, f2_hz >= F2_SPLIT_HZ) {
        (true, true) => Vowel::Ee,
        (false, true) => Vowel::Ah,
        (true, false) => Vowel::Oh,
        (false, false) => Vowel::Oo,
    }
}

fn formant_report(formants: Option<Formants>) -> FormantReport {
    match formants {
        Some(f) => FormantReport {
            f1_hz: Some(f.f1_hz),
            f2_hz: Some(f.f2_hz),
            vowel: classify_vowel(f.f1_hz, f.f2_hz),
        },
        None => FormantReport::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const TICK: f32 = 1024.0 / 44100.0;

    /// Frequency track with sinusoidal vibrato, one value per tick.
    fn vibrato_track(center: f32, depth_hz: f32, rate_hz: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| center + depth_hz * (2.0 * PI * rate_hz * i as f32 * TICK).sin())
            .collect()
    }

    #[test]
    fn range_of_empty_history_is_none() {
        assert!(pitch_range(&[]).is_none());
    }

    #[test]
    fn range_maps_to_notes() {
        let range = pitch_range(&[220.0, 330.0, 440.0]).unwrap();
        assert_eq!(range.lowest_note, "A3");
        assert_eq!(range.highest_note, "A4");
        assert!((range.semitones - 12.0).abs() < 0.01);
    }

    #[test]
    fn stability_needs_ten_samples() {
        let s = stability(&[440.0; 9], 10);
        assert!(!s.available);
        assert_eq!(s.consistency, 0.0);
        assert!(stability(&[440.0; 10], 10).available);
    }

    #[test]
    fn steady_pitch_is_fully_consistent() {
        let s = stability(&[440.0; 50], 10);
        assert_eq!(s.consistency, 100.0);
        assert_eq!(s.avg_deviation_cents, 0.0);
        assert!((s.mean_hz - 440.0).abs() < 1e-3);
    }

    #[test]
    fn consistency_falls_as_variance_grows() {
        let mut last = f32::INFINITY;
        for spread in [0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0] {
            let track: Vec<f32> = (0..100)
                .map(|i| if i % 2 == 0 { 440.0 + spread } else { 440.0 - spread })
                .collect();
            let s = stability(&track, 10);
            assert!(s.consistency <= last, "spread {spread} raised consistency");
            last = s.consistency;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn detects_regular_vibrato() {
        let cfg = AnalysisConfig::default();
        let track = vibrato_track(440.0, 6.0, 5.5, 100);
        let v = vibrato(&track, track.len(), &cfg, TICK);
        assert!(v.detected);
        assert!((v.rate_hz - 5.5).abs() < 1.0, "rate {}", v.rate_hz);
        assert!(v.depth_cents > 18.0 && v.depth_cents < 26.0, "depth {}", v.depth_cents);
    }

    #[test]
    fn steady_note_has_no_vibrato() {
        let cfg = AnalysisConfig::default();
        let v = vibrato(&[440.0; 100], 100, &cfg, TICK);
        assert!(!v.detected);
        assert_eq!(v.cycles, 0);
    }

    #[test]
    fn vibrato_needs_twenty_samples() {
        let cfg = AnalysisConfig::default();
        let track = vibrato_track(440.0, 6.0, 5.5, 19);
        assert_eq!(vibrato(&track, track.len(), &cfg, TICK), Vibrato::default());
    }

    #[test]
    fn never_detected_below_four_cycles() {
        let cfg = AnalysisConfig::default();
        for cycles in 0..=3usize {
            // 8 samples per cycle, then a flat tail to pass the length check
            let mut track: Vec<f32> = (0..cycles * 8)
                .map(|i| 440.0 + 6.0 * (2.0 * PI * i as f32 / 8.0).sin())
                .collect();
            track.extend(std::iter::repeat(440.0).take(40));
            let v = vibrato(&track, track.len(), &cfg, TICK);
            assert!(!v.detected, "{cycles} cycles reported as vibrato");
            assert!(v.cycles <= 3);
        }
    }

    #[test]
    fn relaxed_config_cannot_lower_vibrato_floor() {
        let cfg = AnalysisConfig {
            vibrato_min_cycles: 1,
            vibrato_min_samples: 3,
            ..AnalysisConfig::default()
        };
        let mut track: Vec<f32> = (0..16)
            .map(|i| 440.0 + 6.0 * (2.0 * PI * i as f32 / 8.0).sin())
            .collect();
        track.extend(std::iter::repeat(440.0).take(40));
        assert!(!vibrato(&track, track.len(), &cfg, TICK).detected);

        let short = vibrato_track(440.0, 6.0, 5.5, 12);
        assert_eq!(vibrato(&short, short.len(), &cfg, TICK), Vibrato::default());
    }

    #[test]
    fn relaxed_stability_floor_still_needs_ten() {
        assert!(!stability(&[440.0; 3], 1).available);
    }

    #[test]
    fn silent_gap_slows_vibrato_rate() {
        let cfg = AnalysisConfig::default();
        let wobble = vibrato_track(440.0, 6.0, 5.5, 50);

        let sung = HistorySnapshot {
            frequencies: wobble.clone(),
            volumes: vec![50.0; 50],
        };
        let mut gapped = HistorySnapshot {
            frequencies: vec![0.0; 50],
            volumes: vec![0.0; 50],
        };
        gapped.frequencies.extend(&wobble);
        gapped.volumes.extend(vec![50.0; 50]);

        let full = analyze(&sung, &cfg, TICK, None, SessionSummary::default()).vibrato;
        let half = analyze(&gapped, &cfg, TICK, None, SessionSummary::default()).vibrato;
        assert!(full.detected && half.detected);
        assert_eq!(full.cycles, half.cycles);
        assert!((half.rate_hz - full.rate_hz / 2.0).abs() < 1e-3, "{} vs {}", half.rate_hz, full.rate_hz);
    }

    #[test]
    fn small_wobble_under_threshold_is_ignored() {
        let cfg = AnalysisConfig::default();
        let track = vibrato_track(440.0, 0.2, 5.5, 100);
        assert!(!vibrato(&track, track.len(), &cfg, TICK).detected);
    }

    #[test]
    fn volume_stats_skip_silence() {
        let snap = HistorySnapshot {
            frequencies: vec![0.0; 5],
            volumes: vec![0.0, 40.0, 80.0, 0.0, 60.0],
        };
        let v = volume_stats(&snap);
        assert_eq!(v.current, 60.0);
        assert_eq!(v.average, 60.0);
        assert_eq!(v.min, 40.0);
        assert_eq!(v.max, 80.0);
        assert_eq!(v.dynamic_range, 40.0);
    }

    #[test]
    fn volume_stats_empty() {
        assert_eq!(volume_stats(&HistorySnapshot::default()), VolumeStats::default());
    }

    #[test]
    fn vowel_buckets() {
        assert_eq!(classify_vowel(700.0, 2000.0), Vowel::Ee);
        assert_eq!(classify_vowel(300.0, 2000.0), Vowel::Ah);
        assert_eq!(classify_vowel(700.0, 1000.0), Vowel::Oh);
        assert_eq!(classify_vowel(300.0, 800.0), Vowel::Oo);
    }

    #[test]
    fn weak_formants_are_not_applicable() {
        assert_eq!(classify_vowel(150.0, 2000.0), Vowel::NotApplicable);
        assert_eq!(classify_vowel(700.0, 400.0), Vowel::NotApplicable);
        assert_eq!(classify_vowel(0.0, 0.0), Vowel::NotApplicable);
        assert_eq!(classify_vowel(f32::NAN, 1000.0), Vowel::NotApplicable);
    }

    #[test]
    fn analyze_empty_history_is_neutral() {
        let cfg = AnalysisConfig::default();
        let m = analyze(
            &HistorySnapshot::default(),
            &cfg,
            TICK,
            None,
            SessionSummary::default(),
        );
        assert!(m.pitch_range.is_none());
        assert!(!m.vibrato.detected);
        assert!(!m.stability.available);
        assert_eq!(m.formants.vowel, Vowel::NotApplicable);
        assert_eq!(m.volume, VolumeStats::default());
    }

    #[test]
    fn analyze_uses_supplied_formants() {
        let cfg = AnalysisConfig::default();
        let m = analyze(
            &HistorySnapshot::default(),
            &cfg,
            TICK,
            Some(Formants { f1_hz: 300.0, f2_hz: 800.0 }),
            SessionSummary::default(),
        );
        assert_eq!(m.formants.f1_hz, Some(300.0));
        assert_eq!(m.formants.vowel, Vowel::Oo);
    }
}
