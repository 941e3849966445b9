//! Frequency → note mapping in 12-tone equal temperament (A4 = 440 Hz).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pitch::PitchEstimate;
use crate::config::AnalysisConfig;
use crate::util;

pub const A4_HZ: f32 = 440.0;

/// C0 sits 4 octaves and 9 semitones below A4: 440 · 2^(-4.75) ≈ 16.35 Hz.
pub fn c0_hz() -> f32 {
    A4_HZ * 2.0_f32.powf(-4.75)
}

/// Cents on either side of the nearest pitch.
const MAX_CENTS: i32 = 50;

/// The twelve pitch classes, starting from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C#")]
    CSharp,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D#")]
    DSharp,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F#")]
    FSharp,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G#")]
    GSharp,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A#")]
    ASharp,
    #[serde(rename = "B")]
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Semitones above C within an octave.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> NoteName {
        Self::ALL[index % 12]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }

    /// Equal-tempered frequency of this note in the given octave.
    pub fn frequency(self, octave: i32) -> f32 {
        let semitones_from_c0 = octave * 12 + self.index() as i32;
        c0_hz() * 2.0_f32.powf(semitones_from_c0 as f32 / 12.0)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a note label such as "A4", "C#3" or "Bb2" into (note, octave).
pub fn parse_note(label: &str) -> Option<(NoteName, i32)> {
    let label = label.trim();
    let mut chars = label.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = &label[letter.len_utf8()..];
    let (shift, octave_str) = if let Some(r) = rest.strip_prefix('#') {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (-1, r)
    } else {
        (0, rest)
    };

    let octave: i32 = octave_str.parse().ok()?;
    let semitone = base + shift;
    // Cb and B# cross an octave boundary
    let (index, octave) = match semitone {
        -1 => (11, octave - 1),
        12 => (0, octave + 1),
        s => (s as usize, octave),
    };
    Some((NoteName::from_index(index), octave))
}

/// The canonical "current pitch" handed to every consumer.
///
/// For unpitched frames the note fields hold the A4 sentinel; check
/// `frequency_hz` (or `is_voiced`) before trusting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteReading {
    pub note: NoteName,
    pub octave: i32,
    pub cents: i32,
    pub is_in_tune: bool,
    pub frequency_hz: f32,
    /// Loudness on a 0-100 scale.
    pub volume: f32,
    pub confidence: f32,
    #[serde(with = "duration_ms")]
    pub timestamp: Duration,
}

impl NoteReading {
    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }

    /// "A4"-style label.
    pub fn label(&self) -> String {
        format!("{}{}", self.note, self.octave)
    }
}

/// Note, octave and cents for a frequency, before loudness and confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotePosition {
    pub note: NoteName,
    pub octave: i32,
    pub cents: i32,
}

impl NotePosition {
    /// Returned for silence and anything at or below C0.
    pub const SENTINEL: NotePosition = NotePosition {
        note: NoteName::A,
        octave: 4,
        cents: 0,
    };

    pub fn label(&self) -> String {
        format!("{}{}", self.note, self.octave)
    }
}

/// Map a frequency onto the nearest equal-tempered note.
pub fn note_position(frequency_hz: f32) -> NotePosition {
    let c0 = c0_hz();
    if !frequency_hz.is_finite() || frequency_hz <= c0 {
        return NotePosition::SENTINEL;
    }

    let exact = 12.0 * (frequency_hz / c0).log2();
    let h = exact.round();
    let semitones = h as i32;
    let cents = (((exact - h) * 100.0).round() as i32).clamp(-MAX_CENTS, MAX_CENTS);

    NotePosition {
        note: NoteName::from_index(semitones.rem_euclid(12) as usize),
        octave: semitones.div_euclid(12),
        cents,
    }
}

/// Turn a pitch estimate into a `NoteReading`.
///
/// `recent_voiced` holds the latest voiced frequencies from the rolling
/// history, oldest first, *not* including this estimate.
pub fn reading_from_estimate(
    estimate: &PitchEstimate,
    recent_voiced: &[f32],
    config: &AnalysisConfig,
) -> NoteReading {
    let volume = util::volume_percent(estimate.rms);

    if !estimate.is_voiced() {
        let sentinel = NotePosition::SENTINEL;
        return NoteReading {
            note: sentinel.note,
            octave: sentinel.octave,
            cents: sentinel.cents,
            is_in_tune: false,
            frequency_hz: 0.0,
            volume,
            confidence: 0.0,
            timestamp: estimate.timestamp,
        };
    }

    let position = note_position(estimate.frequency_hz);
    let is_in_tune = estimate.frequency_hz > c0_hz()
        && (position.cents.abs() as f32) < config.in_tune_cents;

    let mut window: Vec<f32> = recent_voiced
        .iter()
        .rev()
        .take(config.confidence_window.saturating_sub(1))
        .copied()
        .collect();
    window.push(estimate.frequency_hz);

    let confidence =
        volume_score(volume, config.reference_volume) * stability_score(&window);

    NoteReading {
        note: position.note,
        octave: position.octave,
        cents: position.cents,
        is_in_tune,
        frequency_hz: estimate.frequency_hz,
        volume,
        confidence,
        timestamp: estimate.timestamp,
    }
}

/// Loudness part of confidence: saturates at the reference volume.
pub fn volume_score(volume: f32, reference_volume: f32) -> f32 {
    if reference_volume <= 0.0 {
        return 1.0;
    }
    (volume / reference_volume).clamp(0.0, 1.0)
}

/// Stability part of confidence from a handful of recent voiced readings.
///
/// 1.0 for a perfectly steady pitch, falling to 0 once the coefficient of
/// variation reaches 10%. A single reading proves nothing either way and
/// scores 0.5.
pub fn stability_score(voiced: &[f32]) -> f32 {
    let voiced: Vec<f32> = voiced.iter().copied().filter(|&f| f > 0.0).collect();
    if voiced.len() < 2 {
        return 0.5;
    }
    match util::mean_std(&voiced) {
        Some((mean, std)) if mean > 0.0 => (1.0 - (std / mean) * 10.0).max(0.0),
        _ => 0.0,
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(freq: f32, rms: f32) -> PitchEstimate {
        PitchEstimate {
            frequency_hz: freq,
            confidence: 1.0,
            rms,
            timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn a440_is_a4() {
        let pos = note_position(440.0);
        assert_eq!(pos.note, NoteName::A);
        assert_eq!(pos.octave, 4);
        assert_eq!(pos.cents, 0);
    }

    #[test]
    fn a880_is_a5() {
        let pos = note_position(880.0);
        assert_eq!((pos.note, pos.octave, pos.cents), (NoteName::A, 5, 0));
    }

    #[test]
    fn a_sharp_4() {
        let pos = note_position(466.16);
        assert_eq!(pos.note, NoteName::ASharp);
        assert_eq!(pos.octave, 4);
        assert!(pos.cents.abs() <= 1);
    }

    #[test]
    fn middle_c() {
        let pos = note_position(261.63);
        assert_eq!((pos.note, pos.octave), (NoteName::C, 4));
    }

    #[test]
    fn b_to_c_octave_boundary() {
        // B3 ≈ 246.94, C4 ≈ 261.63: octave number changes at C
        assert_eq!(note_position(246.94).octave, 3);
        assert_eq!(note_position(246.94).note, NoteName::B);
        assert_eq!(note_position(261.63).octave, 4);
    }

    #[test]
    fn cents_sign_follows_deviation() {
        // 20 cents sharp of A4
        let sharp = 440.0 * 2.0_f32.powf(20.0 / 1200.0);
        assert_eq!(note_position(sharp).cents, 20);
        let flat = 440.0 * 2.0_f32.powf(-30.0 / 1200.0);
        assert_eq!(note_position(flat).cents, -30);
        assert_eq!(note_position(flat).note, NoteName::A);
    }

    #[test]
    fn cents_always_within_half_semitone() {
        let mut f = 20.0_f32;
        while f < 4000.0 {
            let pos = note_position(f);
            assert!((-50..=50).contains(&pos.cents), "{f} Hz gave {} cents", pos.cents);
            f *= 1.0037;
        }
    }

    #[test]
    fn equal_tempered_pitches_round_trip() {
        for octave in 1..7 {
            for note in NoteName::ALL {
                let f = note.frequency(octave);
                let pos = note_position(f);
                assert_eq!((pos.note, pos.octave), (note, octave), "{f} Hz");
                let back = pos.note.frequency(pos.octave);
                let cents_off = 1200.0 * (f / back).log2();
                assert!(cents_off.abs() < 1.0);
            }
        }
    }

    #[test]
    fn zero_and_sub_c0_map_to_sentinel() {
        assert_eq!(note_position(0.0), NotePosition::SENTINEL);
        assert_eq!(note_position(-5.0), NotePosition::SENTINEL);
        assert_eq!(note_position(c0_hz()), NotePosition::SENTINEL);
        assert_eq!(note_position(f32::NAN), NotePosition::SENTINEL);
    }

    #[test]
    fn silent_reading_is_sentinel_and_not_in_tune() {
        let cfg = AnalysisConfig::default();
        let reading = reading_from_estimate(&estimate(0.0, 0.0), &[], &cfg);
        assert_eq!(reading.note, NoteName::A);
        assert_eq!(reading.octave, 4);
        assert!(!reading.is_in_tune);
        assert!(!reading.is_voiced());
        assert_eq!(reading.confidence, 0.0);
    }

    #[test]
    fn in_tune_threshold_is_strict() {
        let cfg = AnalysisConfig::default();
        let nine = 440.0 * 2.0_f32.powf(9.0 / 1200.0);
        let ten = 440.0 * 2.0_f32.powf(10.0 / 1200.0);
        assert!(reading_from_estimate(&estimate(nine, 0.3), &[], &cfg).is_in_tune);
        assert!(!reading_from_estimate(&estimate(ten, 0.3), &[], &cfg).is_in_tune);
    }

    #[test]
    fn confidence_needs_volume_and_stability() {
        let cfg = AnalysisConfig::default();
        let steady = [440.0, 440.0, 440.0, 440.0];

        let loud = reading_from_estimate(&estimate(440.0, 0.3), &steady, &cfg);
        assert!((loud.confidence - 1.0).abs() < 1e-6);

        // -54 dBFS → volume 10 → volume score 0.2
        let quiet = reading_from_estimate(&estimate(440.0, 0.002), &steady, &cfg);
        assert!(quiet.confidence < 0.25);

        let jumpy = [300.0, 500.0, 350.0, 520.0];
        let unstable = reading_from_estimate(&estimate(440.0, 0.3), &jumpy, &cfg);
        assert_eq!(unstable.confidence, 0.0);
    }

    #[test]
    fn first_reading_has_neutral_stability() {
        let cfg = AnalysisConfig::default();
        let reading = reading_from_estimate(&estimate(440.0, 0.3), &[], &cfg);
        assert!((reading.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn confidence_window_only_uses_latest_readings() {
        let cfg = AnalysisConfig::default();
        // Old wild values fall outside the 5-reading window
        let history = [100.0, 900.0, 440.0, 440.0, 440.0, 440.0];
        let reading = reading_from_estimate(&estimate(440.0, 0.3), &history, &cfg);
        assert!((reading.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_note_labels() {
        assert_eq!(parse_note("A4"), Some((NoteName::A, 4)));
        assert_eq!(parse_note("c#3"), Some((NoteName::CSharp, 3)));
        assert_eq!(parse_note("Bb2"), Some((NoteName::ASharp, 2)));
        assert_eq!(parse_note("Cb4"), Some((NoteName::B, 3)));
        assert_eq!(parse_note("B#3"), Some((NoteName::C, 4)));
        assert_eq!(parse_note("H2"), None);
        assert_eq!(parse_note("A"), None);
    }

    #[test]
    fn reading_serializes_note_names() {
        let cfg = AnalysisConfig::default();
        let reading = reading_from_estimate(&estimate(466.16, 0.3), &[], &cfg);
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"note\":\"A#\""));
        assert!(json.contains("\"timestamp\":0"));
    }
}
