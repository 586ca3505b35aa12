//! tally-pipeline: runs the aggregator, gated sink and control loop as
//! one cooperative event loop.
//!
//! # Components
//!
//! - **`pipeline`**: `Pipeline::run`, the single-task `select!` loop
//! - **`producer`**: `SyntheticProducer`, a randomized request-count source
//! - **`error`**: run-level failures
//!
//! # Event loop
//!
//! ```text
//!            ┌──────────── one task, no locks ────────────┐
//! producer ─▶│ events.recv()   → Aggregator::consume       │
//!            │ sink tick       → GatedSink::tick           │
//!            │ readiness.recv()→ Aggregator::flush(sink)   │
//!            │ startup / poll  → ControlLoop::poll(sink)   │─▶ ScaleUp channel
//!            │ End(truth)      → ControlLoop::drain        │
//!            │ grace elapsed   → ControlLoop::finish       │─▶ ReconciliationReport
//!            └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod pipeline;
pub mod producer;

use tokio::sync::{mpsc, watch};
use tracing::warn;

use tally_autoscale::ScaleUp;
use tally_core::{Clock, Settings};

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, ProducerEvent, RunSummary};
pub use producer::SyntheticProducer;

/// Run one pipeline fed by a `SyntheticProducer`.
///
/// Scale-up signals go to `signals` when given. Returns the run summary,
/// or the first run-level failure.
pub async fn run_synthetic<C>(
    settings: Settings,
    clock: C,
    signals: Option<mpsc::UnboundedSender<ScaleUp>>,
    shutdown: watch::Receiver<bool>,
) -> PipelineResult<RunSummary>
where
    C: Clock + Clone + 'static,
{
    let (tx, rx) = mpsc::channel(settings.producer.channel_capacity);

    let producer = SyntheticProducer::new(settings.producer, clock.clone());
    let producer_handle = tokio::spawn(producer.run(tx));

    let mut pipeline = Pipeline::new(settings, clock);
    if let Some(signals) = signals {
        pipeline = pipeline.with_scale_signals(signals);
    }
    let result = pipeline.run(rx, shutdown).await;

    producer_handle.abort();
    if let Ok(Err(e)) = producer_handle.await {
        warn!(error = %e, "producer stopped early");
    }
    result
}
