use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldPhase {
    Idle,
    Holding,
    Complete,
}

/// What a challenge needs to know about the current hold attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteHoldState {
    pub phase: HoldPhase,
    pub is_holding: bool,
    /// 0.0-1.0, exactly 1.0 once complete.
    pub hold_progress: f32,
    pub is_complete: bool,
    pub time_held_ms: u64,
}

impl NoteHoldState {
    pub const IDLE: NoteHoldState = NoteHoldState {
        phase: HoldPhase::Idle,
        is_holding: false,
        hold_progress: 0.0,
        is_complete: false,
        time_held_ms: 0,
    };
}

impl Default for NoteHoldState {
    fn default() -> Self {
        Self::IDLE
    }
}

/// One tick's worth of hold inputs.
#[derive(Debug, Clone, Copy)]
pub struct HoldInput {
    pub target_hz: f32,
    pub current_hz: f32,
    /// Supplied by the caller; the tracker does not judge stability itself.
    pub is_stable: bool,
    pub confidence: f32,
    pub required: Duration,
    pub tolerance_hz: f32,
}

/// Tracks whether a target pitch has been held continuously long enough.
///
/// Idle → Holding when the pitch is within tolerance, stable and confident;
/// Holding → Idle as soon as any of those lapses (no partial credit);
/// Holding → Complete once the required time has elapsed. Complete stays
/// put until `reset`.
#[derive(Debug, Clone)]
pub struct NoteHoldTracker {
    min_confidence: f32,
    phase: HoldPhase,
    started: Option<Duration>,
    state: NoteHoldState,
}

impl NoteHoldTracker {
    pub fn new(min_confidence: f32) -> Self {
        Self {
            min_confidence,
            phase: HoldPhase::Idle,
            started: None,
            state: NoteHoldState::IDLE,
        }
    }

    pub fn state(&self) -> NoteHoldState {
        self.state
    }

    /// Advance the state machine to `now` (on the session's audio clock).
    pub fn track(&mut self, now: Duration, input: &HoldInput) -> NoteHoldState {
        let in_tune = self.is_in_tune(input);

        match self.phase {
            HoldPhase::Complete => {}
            HoldPhase::Idle => {
                if in_tune {
                    log::debug!("Hold started on {:.1} Hz at {:?}", input.current_hz, now);
                    self.phase = HoldPhase::Holding;
                    self.started = Some(now);
                    self.update_progress(now, input.required);
                }
            }
            HoldPhase::Holding => {
                if in_tune {
                    self.update_progress(now, input.required);
                } else {
                    log::debug!("Hold broken at {:?}", now);
                    self.phase = HoldPhase::Idle;
                    self.started = None;
                    self.state = NoteHoldState::IDLE;
                }
            }
        }

        self.state
    }

    /// Back to Idle with no progress.
    pub fn reset(&mut self) {
        self.phase = HoldPhase::Idle;
        self.started = None;
        self.state = NoteHoldState::IDLE;
    }

    fn is_in_tune(&self, input: &HoldInput) -> bool {
        input.current_hz > 0.0
            && (input.current_hz - input.target_hz).abs() <= input.tolerance_hz
            && input.is_stable
            && input.confidence > self.min_confidence
    }

    fn update_progress(&mut self, now: Duration, required: Duration) {
        let started = self.started.unwrap_or(now);
        let held = now.saturating_sub(started);

        if held >= required {
            log::debug!("Hold complete after {:?}", held);
            self.phase = HoldPhase::Complete;
            self.state = NoteHoldState {
                phase: HoldPhase::Complete,
                is_holding: false,
                hold_progress: 1.0,
                is_complete: true,
                time_held_ms: held.as_millis() as u64,
            };
            return;
        }

        let progress = held.as_secs_f64() / required.as_secs_f64();
        self.state = NoteHoldState {
            phase: HoldPhase::Holding,
            is_holding: true,
            hold_progress: (progress as f32).min(1.0),
            is_complete: false,
            time_held_ms: held.as_millis() as u64,
        };
    }
}
