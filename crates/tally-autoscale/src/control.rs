//! Control loop: polls the sink at a fixed lag and emits scale-up
//! signals.
//!
//! The loop itself owns no timers; the pipeline driver decides when the
//! startup delay, poll interval and drain grace elapse and calls the
//! matching transition here. Every transition checks the current phase.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tally_core::{
    BucketKey, ControlTiming, GroundTruth, Observation, Timestamp, duration_millis,
};
use tally_sink::{BucketReader, GatedSink};

use crate::error::{ControlError, ControlResult};
use crate::reconcile::{ReconciliationReport, reconcile};

/// What each polled bucket looked like: queried key → observation.
pub type ObservationLog = BTreeMap<BucketKey, Observation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlPhase {
    /// Waiting out the startup delay.
    Idle,
    /// Polling the sink every interval.
    Polling,
    /// End of run received; sink shut down, waiting out the grace delay.
    Draining,
    /// Reconciled.
    Done,
}

/// Signal for the external scale controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleUp {
    pub key: BucketKey,
    pub observed: u64,
    pub threshold: u64,
}

/// Counters for metrics exposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlStats {
    pub polls: u64,
    /// Polls that found data.
    pub observed: u64,
    /// Polls that found nothing.
    pub no_data: u64,
    pub scale_ups: u64,
}

pub struct ControlLoop {
    timing: ControlTiming,
    phase: ControlPhase,
    observations: ObservationLog,
    ground_truth: Option<GroundTruth>,
    /// Channel to the scale controller, if one is attached.
    signals: Option<mpsc::UnboundedSender<ScaleUp>>,
    stats: ControlStats,
}

impl ControlLoop {
    pub fn new(timing: ControlTiming) -> Self {
        Self {
            timing,
            phase: ControlPhase::Idle,
            observations: ObservationLog::new(),
            ground_truth: None,
            signals: None,
            stats: ControlStats::default(),
        }
    }

    /// Deliver scale-up signals to an external controller.
    pub fn with_signal_channel(mut self, tx: mpsc::UnboundedSender<ScaleUp>) -> Self {
        self.signals = Some(tx);
        self
    }

    pub fn phase(&self) -> ControlPhase {
        self.phase
    }

    pub fn timing(&self) -> &ControlTiming {
        &self.timing
    }

    pub fn observations(&self) -> &ObservationLog {
        &self.observations
    }

    pub fn stats(&self) -> ControlStats {
        self.stats
    }

    /// The bucket polled at `now`: `lag` behind, truncated to the second.
    pub fn target_key(&self, now: Timestamp) -> BucketKey {
        now.saturating_sub(self.timing.lag).bucket()
    }

    /// Startup delay elapsed: Idle → Polling.
    pub fn begin_polling(&mut self) -> ControlResult<()> {
        self.require(ControlPhase::Idle, "begin polling")?;
        self.phase = ControlPhase::Polling;
        info!(
            poll_interval_ms = duration_millis(self.timing.poll_interval),
            lag_ms = duration_millis(self.timing.lag),
            threshold = self.timing.threshold,
            "control loop polling"
        );
        Ok(())
    }

    /// Look up the lagged bucket, record it, and decide.
    ///
    /// Returns the signal when the observed count is strictly above the
    /// threshold. `NoData` is logged but never signals.
    pub fn poll<R: BucketReader + ?Sized>(
        &mut self,
        sink: &R,
        now: Timestamp,
    ) -> ControlResult<Option<ScaleUp>> {
        self.require(ControlPhase::Polling, "poll")?;

        let key = self.target_key(now);
        let observation = sink.lookup(key.start());
        self.observations.insert(key, observation);
        self.stats.polls += 1;

        let observed = match observation {
            Observation::Count(n) => {
                self.stats.observed += 1;
                n
            }
            Observation::NoData => {
                self.stats.no_data += 1;
                debug!(%key, %now, "no data for lagged bucket");
                return Ok(None);
            }
        };

        if observed <= self.timing.threshold {
            debug!(%key, observed, threshold = self.timing.threshold, "below threshold");
            return Ok(None);
        }

        let signal = ScaleUp {
            key,
            observed,
            threshold: self.timing.threshold,
        };
        self.stats.scale_ups += 1;
        info!(%key, observed, threshold = signal.threshold, "scaling up");
        self.emit(signal);
        Ok(Some(signal))
    }

    /// End of run: stop polling, shut the sink, keep the ground truth for
    /// reconciliation. Allowed from Idle (run ended before polling began)
    /// or Polling.
    pub fn drain(&mut self, ground_truth: GroundTruth, sink: &mut GatedSink) -> ControlResult<()> {
        if !matches!(self.phase, ControlPhase::Idle | ControlPhase::Polling) {
            return Err(ControlError::UnexpectedPhase {
                operation: "drain",
                phase: self.phase,
            });
        }

        info!(
            observations = self.observations.len(),
            truth_buckets = ground_truth.len(),
            "end of run, draining"
        );
        self.phase = ControlPhase::Draining;
        self.ground_truth = Some(ground_truth);
        sink.shutdown();
        Ok(())
    }

    /// Grace delay elapsed: Draining → Done, with the reconciliation.
    pub fn finish(&mut self) -> ControlResult<ReconciliationReport> {
        self.require(ControlPhase::Draining, "reconcile")?;
        self.phase = ControlPhase::Done;

        let ground_truth = self.ground_truth.take().unwrap_or_default();
        let report = reconcile(&self.observations, ground_truth)?;
        info!(
            compared = report.compared,
            mismatches = report.mismatches.len(),
            "reconciliation complete"
        );
        Ok(report)
    }

    fn require(&self, phase: ControlPhase, operation: &'static str) -> ControlResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(ControlError::UnexpectedPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    fn emit(&mut self, signal: ScaleUp) {
        let Some(tx) = &self.signals else {
            return;
        };
        if tx.send(signal).is_err() {
            warn!(key = %signal.key, "scale controller gone, dropping signals");
            self.signals = None;
        }
    }
}
