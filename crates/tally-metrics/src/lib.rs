//! tally-metrics: observability for a pipeline run.
//!
//! Gathers the counters each stage keeps (aggregator, sink, control loop)
//! into one `PipelineStats` and renders it in the Prometheus text format.
//!
//! ```text
//! PipelineStats
//!   ├── AggregatorStats  (samples, late samples, flushes, rejected handoffs)
//!   ├── SinkStats        (accepted, rejected, overwritten, readiness)
//!   └── ControlStats     (polls, observed, no data, scale-ups)
//!         └── render_prometheus() → text/plain
//! ```

pub mod prometheus;

pub use prometheus::{PipelineStats, render_prometheus};
