//! Gated sink: a point store that only accepts writes during its
//! accepting phase.
//!
//! Models a downstream consumer with bounded availability: writers must
//! wait for a readiness notification and be prepared for rejection.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use tally_core::{BucketKey, Observation, SinkTiming, Timestamp};

use crate::error::{SinkError, SinkResult};
use crate::phase::{DutyCycle, Phase};
use crate::readiness::{ReadinessHub, ReadinessSubscription};
use crate::{BucketReader, BucketWriter};

/// Counters for metrics exposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Writes stored.
    pub accepted: u64,
    /// Writes refused as not ready.
    pub rejected: u64,
    /// Accepted writes that replaced an existing bucket.
    pub overwritten: u64,
    /// Transitions into the accepting phase.
    pub readiness_notifications: u64,
}

pub struct GatedSink {
    duty: DutyCycle,
    started_at: Timestamp,
    phase: Phase,
    shut_down: bool,
    /// Accepted counts: bucket → count. Never pruned during a run.
    store: BTreeMap<BucketKey, u64>,
    readiness: ReadinessHub,
    stats: SinkStats,
}

impl GatedSink {
    /// Create a sink whose first cycle (rejecting phase first) starts at
    /// `started_at`.
    pub fn new(timing: &SinkTiming, started_at: Timestamp) -> Self {
        Self::with_duty_cycle(DutyCycle::from_timing(timing), started_at)
    }

    pub fn with_duty_cycle(duty: DutyCycle, started_at: Timestamp) -> Self {
        Self {
            duty,
            started_at,
            phase: Phase::Rejecting,
            shut_down: false,
            store: BTreeMap::new(),
            readiness: ReadinessHub::default(),
            stats: SinkStats::default(),
        }
    }

    /// Subscribe to readiness notifications.
    pub fn subscribe(&mut self) -> ReadinessSubscription {
        self.readiness.subscribe()
    }

    /// Recompute the phase for `now`.
    ///
    /// Returns the new phase when it changed. A change into `Accepting`
    /// notifies every subscriber exactly once. No-op after shutdown.
    pub fn tick(&mut self, now: Timestamp) -> Option<Phase> {
        if self.shut_down {
            return None;
        }

        let next = self.duty.phase_at(now.since(self.started_at));
        if next == self.phase {
            return None;
        }
        self.phase = next;

        match next {
            Phase::Accepting => {
                let notified = self.readiness.notify();
                self.stats.readiness_notifications += 1;
                debug!(%now, subscribers = notified, "sink ready to receive");
            }
            Phase::Rejecting => {
                debug!(%now, "sink stopped receiving");
            }
        }
        Some(next)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stop accepting for good. Idempotent.
    ///
    /// Later ticks do nothing, later writes fail, and every readiness
    /// subscription sees the end of its stream.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.phase = Phase::Rejecting;
        self.readiness.close();
        info!(buckets = self.store.len(), "sink shut down");
    }

    /// Number of buckets stored.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Live readiness subscriptions.
    pub fn subscribers(&self) -> usize {
        self.readiness.live()
    }
}

impl BucketWriter for GatedSink {
    fn accept(&mut self, key: BucketKey, count: u64) -> SinkResult<()> {
        if self.shut_down {
            self.stats.rejected += 1;
            return Err(SinkError::ShutDown);
        }
        if self.phase == Phase::Rejecting {
            self.stats.rejected += 1;
            return Err(SinkError::Rejecting);
        }

        if let Some(previous) = self.store.insert(key, count) {
            self.stats.overwritten += 1;
            warn!(%key, previous, count, "bucket offered twice, overwriting");
        }
        self.stats.accepted += 1;
        Ok(())
    }
}

impl BucketReader for GatedSink {
    fn lookup(&self, at: Timestamp) -> Observation {
        self.store.get(&at.bucket()).copied().into()
    }
}
