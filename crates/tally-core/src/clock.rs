//! Wall-clock sources.
//!
//! The pipeline needs epoch timestamps (bucket keys are wall-clock seconds)
//! while its timers run on tokio time. `TokioClock` ties the two together
//! by anchoring an epoch value to a `tokio::time::Instant`, so paused tokio
//! time in tests moves the wall clock as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::{Timestamp, duration_millis};

/// Source of "now" for every pipeline stage.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Epoch clock driven by tokio's monotonic time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_epoch: Timestamp,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor to the current system time.
    pub fn system() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self::anchored_at(Timestamp::from_millis(
            u64::try_from(millis).unwrap_or(u64::MAX),
        ))
    }

    /// Anchor to an arbitrary epoch value (tests use aligned seconds).
    pub fn anchored_at(epoch: Timestamp) -> Self {
        Self {
            origin_epoch: epoch,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.origin_epoch.saturating_add(self.origin.elapsed())
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self(Arc::new(AtomicU64::new(start.as_millis())))
    }

    pub fn set(&self, ts: Timestamp) {
        self.0.store(ts.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, d: Duration) {
        self.0.fetch_add(duration_millis(d), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.0.load(Ordering::SeqCst))
    }
}
