//! The pipeline event loop.
//!
//! One task owns the aggregator, the sink and the control loop. Every
//! producer event, sink tick, readiness notification and control timer is
//! handled as a branch of a single `select!`, so no stage needs a lock and
//! each step sees a consistent view of the others.

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use tally_aggregate::Aggregator;
use tally_autoscale::{ControlLoop, ControlPhase, ReconciliationReport, ScaleUp};
use tally_core::{Clock, GroundTruth, RawSample, Sample, Settings, duration_millis};
use tally_metrics::PipelineStats;
use tally_sink::GatedSink;

use crate::error::{PipelineError, PipelineResult};

/// What a producer sends down the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    Sample(RawSample),
    /// Production finished; carries the exact per-bucket totals produced.
    End(GroundTruth),
}

/// Result of a clean run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: ReconciliationReport,
    pub stats: PipelineStats,
}

pub struct Pipeline<C> {
    settings: Settings,
    clock: C,
    signals: Option<mpsc::UnboundedSender<ScaleUp>>,
}

impl<C: Clock> Pipeline<C> {
    pub fn new(settings: Settings, clock: C) -> Self {
        Self {
            settings,
            clock,
            signals: None,
        }
    }

    /// Forward scale-up signals to an external controller.
    pub fn with_scale_signals(mut self, tx: mpsc::UnboundedSender<ScaleUp>) -> Self {
        self.signals = Some(tx);
        self
    }

    /// Run until the producer's end-of-run has been drained and reconciled.
    ///
    /// Fails when the producer disappears without ground truth, when
    /// `shutdown` flips to `true`, or when reconciliation finds no data or
    /// any mismatch.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ProducerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PipelineResult<RunSummary> {
        let Settings {
            sink: sink_timing,
            control: control_timing,
            ..
        } = self.settings;

        let started_at = self.clock.now();
        let start = Instant::now();

        let mut sink = GatedSink::new(&sink_timing, started_at);
        let mut readiness = sink.subscribe();
        let mut aggregator = Aggregator::new();
        let mut control = ControlLoop::new(control_timing);
        if let Some(tx) = self.signals {
            control = control.with_signal_channel(tx);
        }

        let mut sink_ticks = interval(sink_timing.tick);
        sink_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let startup = sleep(control_timing.startup_delay);
        tokio::pin!(startup);

        let mut polls = interval_at(
            start + control_timing.startup_delay + control_timing.poll_interval,
            control_timing.poll_interval,
        );
        polls.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Armed when the end of run arrives.
        let grace = sleep_until(start);
        tokio::pin!(grace);

        info!(
            %started_at,
            accepting_ms = duration_millis(sink_timing.accepting),
            rejecting_ms = duration_millis(sink_timing.rejecting),
            lag_ms = duration_millis(control_timing.lag),
            threshold = control_timing.threshold,
            "pipeline started"
        );

        let report = loop {
            let phase = control.phase();

            tokio::select! {
                _ = sink_ticks.tick(), if !sink.is_shut_down() => {
                    sink.tick(self.clock.now());
                }
                Some(_) = readiness.recv() => {
                    let pass = aggregator.flush(&mut sink, self.clock.now());
                    if !pass.flushed.is_empty() || pass.rejection.is_some() {
                        debug!(
                            flushed = pass.flushed.len(),
                            deferred = pass.deferred,
                            retained = pass.retained,
                            rejected = pass.rejection.is_some(),
                            "flush pass"
                        );
                    }
                }
                _ = &mut startup, if phase == ControlPhase::Idle => {
                    control.begin_polling()?;
                }
                _ = polls.tick(), if phase == ControlPhase::Polling => {
                    control.poll(&sink, self.clock.now())?;
                }
                event = events.recv(), if matches!(phase, ControlPhase::Idle | ControlPhase::Polling) => {
                    match event {
                        Some(ProducerEvent::Sample(raw)) => ingest(&mut aggregator, raw),
                        Some(ProducerEvent::End(truth)) => {
                            readiness.cancel();
                            control.drain(truth, &mut sink)?;
                            grace.as_mut().reset(Instant::now() + control_timing.drain_grace);
                        }
                        None => {
                            error!("producer closed before end of run");
                            return Err(PipelineError::ProducerClosed);
                        }
                    }
                }
                _ = &mut grace, if phase == ControlPhase::Draining => {
                    break control.finish()?;
                }
                Ok(()) = shutdown.changed() => {
                    if *shutdown.borrow() {
                        warn!("shutdown requested, abandoning run");
                        return Err(PipelineError::Interrupted);
                    }
                }
            }
        };

        let stats = PipelineStats {
            aggregator: aggregator.stats(),
            sink: sink.stats(),
            control: control.stats(),
            open_buckets: aggregator.open_buckets() as u64,
            stored_buckets: sink.len() as u64,
        };

        match serde_json::to_string(&report) {
            Ok(json) => info!(report = %json, "reconciliation report"),
            Err(e) => warn!(error = %e, "failed to serialize reconciliation report"),
        }

        let report = report.ensure_consistent().inspect_err(|e| {
            error!(error = %e, "observed counts disagree with ground truth");
        })?;

        info!(
            compared = report.compared,
            samples = stats.aggregator.samples,
            scale_ups = stats.control.scale_ups,
            "pipeline finished"
        );
        Ok(RunSummary { report, stats })
    }
}

/// Validate and aggregate one raw sample. Bad or late samples are dropped.
fn ingest(aggregator: &mut Aggregator, raw: RawSample) {
    let sample = match Sample::try_from(raw) {
        Ok(sample) => sample,
        Err(e) => {
            warn!(error = %e, ?raw, "dropping malformed sample");
            return;
        }
    };
    if let Err(e) = aggregator.consume(sample) {
        warn!(error = %e, "dropping late sample");
    }
}
