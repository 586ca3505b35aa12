//! tally-core: shared types for the request-count pipeline.
//!
//! Every stage of the pipeline (aggregator, gated sink, control loop) speaks
//! in terms of the types defined here:
//!
//! - **`types`**: `Timestamp`, `BucketKey`, `Sample`, `Observation`, `GroundTruth`
//! - **`clock`**: the `Clock` trait plus tokio-anchored and manual clocks
//! - **`config`**: `tally.toml` parsing and validated `Settings`
//! - **`error`**: input validation and configuration errors

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{
    AutoscaleConfig, ControlTiming, PipelineConfig, ProducerConfig, ProducerPlan, Settings,
    SinkConfig, SinkTiming,
};
pub use error::{ConfigError, ConfigResult, KeyError, SampleError};
pub use types::*;
