use std::time::Duration;

use crate::analysis::history::RollingHistory;
use crate::analysis::hold::{HoldInput, NoteHoldState, NoteHoldTracker};
use crate::analysis::metrics::{self, VocalMetrics};
use crate::analysis::session_stats::SessionAggregator;
use crate::audio::source::AudioFrame;
use crate::config::AppConfig;
use crate::dsp::formant::{self, Formants};
use crate::dsp::note::{self, NoteReading};
use crate::dsp::pitch::{self, DetectorConfig};

/// All per-session analysis state, advanced one frame at a time.
///
/// Only the history, the aggregator and the hold tracker carry state from
/// one frame to the next. Everything else is recomputed per frame or per
/// `metrics()` call.
pub struct AnalysisEngine {
    config: AppConfig,
    detector: DetectorConfig,
    history: RollingHistory,
    aggregator: SessionAggregator,
    hold: NoteHoldTracker,
    latest: Option<NoteReading>,
    /// Audio-clock time of the most recent frame.
    clock: Duration,
    /// Rate of the frames actually being analysed.
    sample_rate: u32,
    estimated_formants: Option<Formants>,
    external_formants: Option<Formants>,
}

impl AnalysisEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            detector: DetectorConfig::from(&config.detector),
            history: RollingHistory::new(config.analysis.history_capacity),
            aggregator: SessionAggregator::new(Duration::ZERO),
            hold: NoteHoldTracker::new(config.hold.min_confidence),
            latest: None,
            clock: Duration::ZERO,
            sample_rate: config.audio.sample_rate,
            estimated_formants: None,
            external_formants: None,
            config,
        }
    }

    /// Detect, map, record. Returns the reading for this frame.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> NoteReading {
        let timestamp = frame.timestamp();
        self.clock = timestamp;
        self.sample_rate = frame.sample_rate;

        let estimate = pitch::detect_pitch(&frame.samples, frame.sample_rate, timestamp, &self.detector);

        // Confidence looks at the readings before this one.
        let window = self.config.analysis.confidence_window.saturating_sub(1);
        let recent = self.history.recent_voiced(window);
        let reading = note::reading_from_estimate(&estimate, &recent, &self.config.analysis);

        self.history.push(reading.frequency_hz, reading.volume);

        let voiced = self.history.snapshot().voiced_frequencies();
        let stability = metrics::stability(&voiced, self.config.analysis.stability_min_samples);
        self.aggregator
            .record(&reading, stability.available.then_some(stability.consistency));

        if self.config.analysis.estimate_formants
            && self.external_formants.is_none()
            && reading.is_voiced()
        {
            if let Some(found) = formant::estimate_formants(&frame.samples, frame.sample_rate) {
                self.estimated_formants = Some(found);
            }
        }

        log::trace!(
            "{:?}: {:.1} Hz {} {:+}c vol {:.0} conf {:.2}",
            timestamp,
            reading.frequency_hz,
            reading.label(),
            reading.cents,
            reading.volume,
            reading.confidence
        );

        self.latest = Some(reading.clone());
        reading
    }

    pub fn latest(&self) -> Option<&NoteReading> {
        self.latest.as_ref()
    }

    /// Start time of the most recent frame on the audio clock.
    pub fn clock(&self) -> Duration {
        self.clock
    }

    /// Seconds between history entries at the current rate.
    pub fn tick_secs(&self) -> f32 {
        self.config.audio.hop_size as f32 / self.sample_rate.max(1) as f32
    }

    pub fn metrics(&self) -> VocalMetrics {
        metrics::analyze(
            &self.history.snapshot(),
            &self.config.analysis,
            self.tick_secs(),
            self.external_formants.or(self.estimated_formants),
            self.aggregator.summary(),
        )
    }

    /// True when the latest frame is voiced and the last few voiced readings
    /// agree closely enough.
    pub fn is_stable(&self) -> bool {
        let voiced_now = self.latest.as_ref().is_some_and(NoteReading::is_voiced);
        if !voiced_now {
            return false;
        }
        let recent = self.history.recent_voiced(self.config.analysis.confidence_window);
        note::stability_score(&recent) >= self.config.analysis.stable_threshold
    }

    /// Advance the hold tracker to `now`.
    pub fn track_note_hold(&mut self, now: Duration, input: &HoldInput) -> NoteHoldState {
        self.hold.track(now, input)
    }

    /// Hold attempt using the latest reading and the engine's own stability.
    pub fn hold_on_latest(
        &mut self,
        target_hz: f32,
        required: Duration,
        tolerance_hz: f32,
    ) -> NoteHoldState {
        let (current_hz, confidence) = self
            .latest
            .as_ref()
            .map(|r| (r.frequency_hz, r.confidence))
            .unwrap_or((0.0, 0.0));
        let input = HoldInput {
            target_hz,
            current_hz,
            is_stable: self.is_stable(),
            confidence,
            required,
            tolerance_hz,
        };
        self.track_note_hold(self.clock, &input)
    }

    pub fn hold_state(&self) -> NoteHoldState {
        self.hold.state()
    }

    pub fn set_formants(&mut self, formants: Option<Formants>) {
        self.external_formants = formants;
    }

    /// Forget the history, the session stats and any hold in progress. The
    /// session clock restarts at the current position.
    pub fn reset(&mut self) {
        self.history.clear();
        self.aggregator.reset(self.clock);
        self.hold.reset();
        self.latest = None;
        self.estimated_formants = None;
        log::debug!("Engine reset at {:?}", self.clock);
    }
}
