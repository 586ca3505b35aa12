//! Duty-cycle phase computation.
//!
//! The phase is a pure function of the time elapsed since the sink
//! started, so a late or skipped tick never accumulates drift.

use std::time::Duration;

use tally_core::SinkTiming;

/// Which half of the duty cycle the sink is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Rejecting,
    Accepting,
}

/// Rejecting for `rejecting`, then accepting for `accepting`, repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    accepting: Duration,
    rejecting: Duration,
}

impl DutyCycle {
    pub fn new(accepting: Duration, rejecting: Duration) -> Self {
        Self {
            accepting,
            rejecting,
        }
    }

    pub fn from_timing(timing: &SinkTiming) -> Self {
        Self::new(timing.accepting, timing.rejecting)
    }

    pub fn period(&self) -> Duration {
        self.accepting + self.rejecting
    }

    /// Phase at `elapsed` since the start of the first cycle.
    pub fn phase_at(&self, elapsed: Duration) -> Phase {
        let period = self.period().as_millis();
        if period == 0 {
            return Phase::Rejecting;
        }
        let offset = elapsed.as_millis() % period;
        if offset < self.rejecting.as_millis() {
            Phase::Rejecting
        } else {
            Phase::Accepting
        }
    }
}
