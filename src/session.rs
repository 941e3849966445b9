use std::time::{Duration, Instant};

use crate::analysis::hold::{HoldInput, NoteHoldState};
use crate::analysis::metrics::VocalMetrics;
use crate::audio::capture::{CaptureSettings, MicSource, StopListener};
use crate::audio::source::{FrameAssembler, SampleSource, SourceStatus};
use crate::config::AppConfig;
use crate::dsp::formant::Formants;
use crate::dsp::note::NoteReading;
use crate::engine::AnalysisEngine;
use crate::error::SessionError;

/// A listening session: one sample source feeding one analysis engine.
///
/// Readings are pulled with `next_reading`, typically once per tick. The
/// source is released by `stop`, when a finite source runs out, and on drop.
///
/// Hold tracking runs on the session clock: the audio clock while a source
/// is running, and wall time carried on from the last audio position while
/// none is.
pub struct VocalSession {
    config: AppConfig,
    engine: AnalysisEngine,
    source: Option<Box<dyn SampleSource>>,
    assembler: Option<FrameAssembler>,
    scratch: Vec<f32>,
    /// When the session last stopped producing frames, and the audio clock
    /// at that moment.
    idle_since: Option<(Instant, Duration)>,
}

impl VocalSession {
    pub fn new(config: AppConfig) -> Self {
        Self {
            engine: AnalysisEngine::new(config.clone()),
            config,
            source: None,
            assembler: None,
            scratch: Vec::new(),
            idle_since: Some((Instant::now(), Duration::ZERO)),
        }
    }

    /// Open the microphone and start analysing it.
    ///
    /// Resolves once the device is open. Firing the `StopSignal` paired with
    /// `stop` while this is pending returns `SessionError::Cancelled`.
    pub async fn start(&mut self, mut stop: StopListener) -> Result<(), SessionError> {
        self.config.validate()?;
        self.stop();

        let settings = CaptureSettings::from(&self.config.audio);
        let mic = MicSource::acquire(settings, &mut stop).await?;
        if mic.sample_rate() != self.config.audio.sample_rate {
            log::warn!(
                "Requested {} Hz, device runs at {} Hz",
                self.config.audio.sample_rate,
                mic.sample_rate()
            );
        }
        self.start_with(Box::new(mic))
    }

    /// Start analysing an already-open source, with fresh analysis state.
    pub fn start_with(&mut self, source: Box<dyn SampleSource>) -> Result<(), SessionError> {
        self.config.validate()?;
        self.stop();

        let sample_rate = source.sample_rate();
        if sample_rate == 0 {
            return Err(SessionError::Config("source reports a 0 Hz sample rate".into()));
        }

        self.engine = AnalysisEngine::new(self.config.clone());
        self.assembler = Some(FrameAssembler::new(
            self.config.audio.frame_size,
            self.config.audio.hop_size,
            sample_rate,
        ));
        self.source = Some(source);
        self.idle_since = None;
        log::info!("Session started at {sample_rate} Hz");
        Ok(())
    }

    /// Release the source. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.release_source();
        self.assembler = None;
    }

    pub fn is_running(&self) -> bool {
        self.source.is_some()
    }

    /// Analyse the next complete frame, if one is available.
    ///
    /// Never blocks. Returns None when the source has nothing new yet, or
    /// when the session is stopped.
    pub fn next_reading(&mut self) -> Option<NoteReading> {
        loop {
            if let Some(frame) = self.assembler.as_mut()?.next_frame() {
                let reading = self.engine.process_frame(&frame);
                if self.idle_since.is_some() {
                    // Tail frames of a finished source still move the clock.
                    self.idle_since = Some((Instant::now(), self.engine.clock()));
                }
                return Some(reading);
            }

            let source = self.source.as_mut()?;
            self.scratch.clear();
            let status = source.drain(&mut self.scratch);
            if let Some(assembler) = self.assembler.as_mut() {
                assembler.push(&self.scratch);
            }

            match status {
                // Frames already buffered are still delivered.
                SourceStatus::Exhausted => self.release_source(),
                SourceStatus::Active if self.scratch.is_empty() => return None,
                SourceStatus::Active => {}
            }
        }
    }

    /// Every reading that can be produced right now.
    pub fn drain_readings(&mut self) -> Vec<NoteReading> {
        std::iter::from_fn(|| self.next_reading()).collect()
    }

    pub fn latest_reading(&self) -> Option<&NoteReading> {
        self.engine.latest()
    }

    pub fn metrics(&self) -> VocalMetrics {
        self.engine.metrics()
    }

    pub fn is_stable(&self) -> bool {
        self.engine.is_stable()
    }

    /// Current time on the session clock.
    pub fn clock(&self) -> Duration {
        match self.idle_since {
            Some((since, audio_at)) => audio_at + since.elapsed(),
            None => self.engine.clock(),
        }
    }

    /// Advance the hold challenge with caller-supplied inputs at the current
    /// session clock.
    pub fn track_note_hold(
        &mut self,
        target_hz: f32,
        current_hz: f32,
        is_stable: bool,
        confidence: f32,
        required_ms: u64,
        tolerance_hz: f32,
    ) -> NoteHoldState {
        let now = self.clock();
        self.track_note_hold_at(
            now,
            target_hz,
            current_hz,
            is_stable,
            confidence,
            required_ms,
            tolerance_hz,
        )
    }

    /// `track_note_hold` with an explicit timestamp, for callers that keep
    /// their own clock.
    #[allow(clippy::too_many_arguments)]
    pub fn track_note_hold_at(
        &mut self,
        now: Duration,
        target_hz: f32,
        current_hz: f32,
        is_stable: bool,
        confidence: f32,
        required_ms: u64,
        tolerance_hz: f32,
    ) -> NoteHoldState {
        let input = HoldInput {
            target_hz,
            current_hz,
            is_stable,
            confidence,
            required: Duration::from_millis(required_ms),
            tolerance_hz,
        };
        self.engine.track_note_hold(now, &input)
    }

    /// Advance the hold challenge from the latest reading.
    pub fn hold_on_latest(
        &mut self,
        target_hz: f32,
        required_ms: u64,
        tolerance_hz: f32,
    ) -> NoteHoldState {
        self.engine
            .hold_on_latest(target_hz, Duration::from_millis(required_ms), tolerance_hz)
    }

    pub fn hold_state(&self) -> NoteHoldState {
        self.engine.hold_state()
    }

    /// Supply (F1, F2) from an outside analyser, or None to go back to the
    /// built-in estimate.
    pub fn set_formants(&mut self, formants: Option<(f32, f32)>) {
        self.engine
            .set_formants(formants.map(|(f1_hz, f2_hz)| Formants { f1_hz, f2_hz }));
    }

    /// Clear history, session stats and hold progress without touching the
    /// source.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.cleanup();
            self.idle_since = Some((Instant::now(), self.engine.clock()));
            log::info!("Session source released");
        }
    }
}

impl Drop for VocalSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::analysis::hold::HoldPhase;
    use crate::audio::source::BufferSource;
    use crate::dsp::pitch::tests::sine_frame;

    /// Counts cleanup calls so tests can see the device being released.
    struct CountingSource {
        inner: BufferSource,
        cleanups: Arc<AtomicUsize>,
    }

    impl SampleSource for CountingSource {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn drain(&mut self, out: &mut Vec<f32>) -> SourceStatus {
            self.inner.drain(out)
        }

        fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            self.inner.cleanup();
        }
    }

    fn counting(samples: Vec<f32>) -> (Box<dyn SampleSource>, Arc<AtomicUsize>) {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: BufferSource::new(samples, 44100, 512),
            cleanups: cleanups.clone(),
        };
        (Box::new(source), cleanups)
    }

    #[test]
    fn not_started_yields_nothing() {
        let mut session = VocalSession::new(AppConfig::default());
        assert!(!session.is_running());
        assert!(session.next_reading().is_none());
        session.stop();
        session.stop();
    }

    #[test]
    fn exhausting_a_source_releases_it_once() {
        let (source, cleanups) = counting(sine_frame(440.0, 0.5, 44100 / 2));
        let mut session = VocalSession::new(AppConfig::default());
        session.start_with(source).unwrap();

        let readings = session.drain_readings();
        // (22050 - 2048) / 1024 + 1 complete frames
        assert_eq!(readings.len(), 20);
        assert!(!session.is_running());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        session.stop();
        drop(session);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_is_idempotent_and_drop_releases() {
        let (source, cleanups) = counting(vec![0.0; 44100]);
        let mut session = VocalSession::new(AppConfig::default());
        session.start_with(source).unwrap();
        session.stop();
        session.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert!(session.next_reading().is_none());

        let (source, cleanups) = counting(vec![0.0; 44100]);
        let mut session = VocalSession::new(AppConfig::default());
        session.start_with(source).unwrap();
        drop(session);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_begins_with_fresh_state() {
        let mut session = VocalSession::new(AppConfig::default());
        session
            .start_with(Box::new(BufferSource::new(sine_frame(440.0, 0.5, 44100), 44100, 1024)))
            .unwrap();
        session.drain_readings();
        assert!(!session.metrics().session.notes_hit.is_empty());

        session
            .start_with(Box::new(BufferSource::new(vec![0.0; 4096], 44100, 1024)))
            .unwrap();
        assert!(session.metrics().session.notes_hit.is_empty());
        assert!(session.latest_reading().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.audio.frame_size = 1000;
        let mut session = VocalSession::new(config);
        let err = session
            .start_with(Box::new(BufferSource::new(vec![0.0; 10], 44100, 10)))
            .unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn set_formants_feeds_vowel() {
        let mut session = VocalSession::new(AppConfig::default());
        session.set_formants(Some((300.0, 2300.0)));
        let report = session.metrics().formants;
        assert_eq!(report.f1_hz, Some(300.0));
        assert_eq!(report.f2_hz, Some(2300.0));
    }

    #[test]
    fn hold_progresses_without_a_source() {
        let mut session = VocalSession::new(AppConfig::default());
        let mut state = NoteHoldState::IDLE;
        for ms in (0..=3000).step_by(4) {
            state = session.track_note_hold_at(
                Duration::from_millis(ms),
                440.0,
                441.0,
                true,
                0.9,
                3000,
                30.0,
            );
        }
        assert!(state.is_complete);
        assert_eq!(state.time_held_ms, 3000);
    }

    #[test]
    fn idle_clock_follows_wall_time() {
        let mut session = VocalSession::new(AppConfig::default());
        let first = session.track_note_hold(440.0, 441.0, true, 0.9, 20, 30.0);
        assert_eq!(first.phase, HoldPhase::Holding);

        std::thread::sleep(Duration::from_millis(40));
        let later = session.track_note_hold(440.0, 441.0, true, 0.9, 20, 30.0);
        assert!(later.is_complete);
    }

    #[test]
    fn clock_continues_after_source_runs_out() {
        let mut session = VocalSession::new(AppConfig::default());
        session
            .start_with(Box::new(BufferSource::new(sine_frame(440.0, 0.5, 44100), 44100, 1024)))
            .unwrap();
        session.drain_readings();
        assert!(!session.is_running());

        let end_of_audio = session.clock();
        assert!(end_of_audio >= Duration::from_millis(900));
        std::thread::sleep(Duration::from_millis(5));
        assert!(session.clock() > end_of_audio);
    }

    #[test]
    fn explicit_hold_inputs() {
        let mut session = VocalSession::new(AppConfig::default());
        let state = session.track_note_hold(440.0, 445.0, true, 0.9, 0, 30.0);
        assert!(state.is_complete);
        session.reset();
        assert_eq!(session.hold_state(), NoteHoldState::IDLE);
    }
}
