use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::dsp::note::NoteReading;

/// Weight of per-frame tuning accuracy in the accuracy score once stability
/// is known; the rest comes from the stability consistency score.
const CLOSENESS_WEIGHT: f32 = 0.7;

/// Session-level numbers as handed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub duration_secs: f32,
    /// Distinct in-tune notes ("A4", "C#5", ...) in the order first hit.
    pub notes_hit: Vec<String>,
    /// 0-100.
    pub accuracy_score: f32,
    pub voiced_frames: usize,
    pub started_at: Option<DateTime<Local>>,
}

/// Accumulates statistics over a listening session.
///
/// Everything grows monotonically until `reset`; nothing is ever dropped
/// silently.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    start: Duration,
    latest: Duration,
    notes_hit: Vec<String>,
    closeness_sum: f64,
    voiced_frames: usize,
    accuracy_score: f32,
    started_at: DateTime<Local>,
}

impl SessionAggregator {
    /// Start aggregating at `start` on the session's audio clock.
    pub fn new(start: Duration) -> Self {
        Self {
            start,
            latest: start,
            notes_hit: Vec::new(),
            closeness_sum: 0.0,
            voiced_frames: 0,
            accuracy_score: 0.0,
            started_at: Local::now(),
        }
    }

    /// Fold one reading in. `consistency` is the current stability score, if
    /// the history is long enough to have one.
    pub fn record(&mut self, reading: &NoteReading, consistency: Option<f32>) {
        if reading.timestamp > self.latest {
            self.latest = reading.timestamp;
        }

        if !reading.is_voiced() {
            return;
        }

        self.voiced_frames += 1;
        self.closeness_sum += closeness(reading.cents) as f64;

        if reading.is_in_tune {
            let label = reading.label();
            if !self.notes_hit.contains(&label) {
                log::debug!("First in-tune {label} at {:?}", reading.timestamp);
                self.notes_hit.push(label);
            }
        }

        let mean_closeness = (self.closeness_sum / self.voiced_frames as f64) as f32;
        self.accuracy_score = match consistency {
            Some(c) => CLOSENESS_WEIGHT * mean_closeness + (1.0 - CLOSENESS_WEIGHT) * c,
            None => mean_closeness,
        }
        .clamp(0.0, 100.0);
    }

    pub fn duration(&self) -> Duration {
        self.latest.saturating_sub(self.start)
    }

    pub fn notes_hit(&self) -> &[String] {
        &self.notes_hit
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            duration_secs: self.duration().as_secs_f32(),
            notes_hit: self.notes_hit.clone(),
            accuracy_score: self.accuracy_score,
            voiced_frames: self.voiced_frames,
            started_at: Some(self.started_at),
        }
    }

    /// Start over from `start`.
    pub fn reset(&mut self, start: Duration) {
        *self = Self::new(start);
    }
}

/// 100 for a perfectly centred note, 0 at a quarter tone or worse.
fn closeness(cents: i32) -> f32 {
    (100.0 - 2.0 * cents.abs() as f32).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::note::NoteName;

    fn reading(note: NoteName, octave: i32, cents: i32, ms: u64) -> NoteReading {
        NoteReading {
            note,
            octave,
            cents,
            is_in_tune: cents.abs() < 10,
            frequency_hz: note.frequency(octave),
            volume: 70.0,
            confidence: 1.0,
            timestamp: Duration::from_millis(ms),
        }
    }

    fn silence(ms: u64) -> NoteReading {
        NoteReading {
            note: NoteName::A,
            octave: 4,
            cents: 0,
            is_in_tune: false,
            frequency_hz: 0.0,
            volume: 0.0,
            confidence: 0.0,
            timestamp: Duration::from_millis(ms),
        }
    }

    #[test]
    fn notes_hit_are_distinct_and_ordered() {
        let mut agg = SessionAggregator::new(Duration::ZERO);
        agg.record(&reading(NoteName::A, 4, 2, 0), None);
        agg.record(&reading(NoteName::C, 5, -3, 20), None);
        agg.record(&reading(NoteName::A, 4, 0, 40), None);
        assert_eq!(agg.notes_hit(), ["A4", "C5"]);
    }

    #[test]
    fn out_of_tune_notes_are_not_hits() {
        let mut agg = SessionAggregator::new(Duration::ZERO);
        agg.record(&reading(NoteName::E, 4, 30, 0), None);
        assert!(agg.notes_hit().is_empty());
        assert_eq!(agg.summary().voiced_frames, 1);
    }

    #[test]
    fn silent_sentinel_is_never_a_hit() {
        let mut agg = SessionAggregator::new(Duration::ZERO);
        agg.record(&silence(0), None);
        assert!(agg.notes_hit().is_empty());
        assert_eq!(agg.summary().accuracy_score, 0.0);
    }

    #[test]
    fn duration_tracks_audio_clock() {
        let mut agg = SessionAggregator::new(Duration::from_millis(500));
        agg.record(&silence(600), None);
        agg.record(&silence(1500), None);
        assert_eq!(agg.duration(), Duration::from_millis(1000));
        assert!((agg.summary().duration_secs - 1.0).abs() < 1e-6);
    }

    #[test]
    fn accuracy_blends_closeness_and_consistency() {
        let mut agg = SessionAggregator::new(Duration::ZERO);
        agg.record(&reading(NoteName::A, 4, 0, 0), None);
        assert_eq!(agg.summary().accuracy_score, 100.0);

        agg.record(&reading(NoteName::A, 4, 20, 20), None);
        // mean closeness (100 + 60) / 2
        assert!((agg.summary().accuracy_score - 80.0).abs() < 1e-4);

        agg.record(&reading(NoteName::A, 4, 0, 40), Some(50.0));
        // closeness (100 + 60 + 100) / 3 = 86.67 → 0.7·86.67 + 0.3·50
        assert!((agg.summary().accuracy_score - 75.667).abs() < 0.01);
    }

    #[test]
    fn reset_clears_everything() {
        let mut agg = SessionAggregator::new(Duration::ZERO);
        agg.record(&reading(NoteName::G, 3, 1, 2000), None);
        agg.reset(Duration::from_millis(2000));
        let summary = agg.summary();
        assert!(summary.notes_hit.is_empty());
        assert_eq!(summary.duration_secs, 0.0);
        assert_eq!(summary.voiced_frames, 0);
        assert_eq!(summary.accuracy_score, 0.0);
    }
}
