//! # Note Matching
//!
//! Decides frame by frame whether the singer is on the target note and
//! how long the current contiguous hold has lasted.

use std::time::{Duration, Instant};

use crate::tuning::{Note, NoteDetails};

/// Per-frame match result, suitable for display binding.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatchState {
    pub is_on_pitch: bool,
    pub hold_started_at: Option<Instant>,
    pub elapsed_hold: Duration,
}

impl MatchState {
    pub fn elapsed_hold_secs(&self) -> f32 {
        self.elapsed_hold.as_secs_f32()
    }
}

/// True iff the detected note is the target note and within tolerance.
pub fn is_match(details: &NoteDetails, target: &Note, cent_tolerance: f32) -> bool {
    details.note_number == target.note_number() && details.cents.abs() <= cent_tolerance
}

/// Tracks a contiguous hold on one target. Any non-matching frame,
/// including a frame with no pitch, restarts the hold from zero.
#[derive(Debug, Clone)]
pub struct HoldTracker {
    cent_tolerance: f32,
    state: MatchState,
}

impl HoldTracker {
    pub fn new(cent_tolerance: f32) -> Self {
        Self {
            cent_tolerance,
            state: MatchState::default(),
        }
    }

    pub fn cent_tolerance(&self) -> f32 {
        self.cent_tolerance
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn update(&mut self, details: Option<&NoteDetails>, target: &Note, now: Instant) -> MatchState {
        let matched = details.is_some_and(|d| is_match(d, target, self.cent_tolerance));

        if matched {
            let started = *self.state.hold_started_at.get_or_insert(now);
            self.state.is_on_pitch = true;
            self.state.elapsed_hold = now.saturating_duration_since(started);
        } else {
            self.reset();
        }
        self.state
    }

    pub fn reset(&mut self) {
        self.state = MatchState::default();
    }
}
