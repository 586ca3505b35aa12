//! tally-autoscale: the control loop that turns bucket counts into
//! scale-up decisions.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──begin_polling()──▶ Polling ──drain(truth)──▶ Draining ──finish()──▶ Done
//!                              │
//!                              └─ poll(now): key = bucket(now - lag)
//!                                  lookup → log[key] = observation
//!                                  observation > threshold → ScaleUp
//! ```
//!
//! Reconciliation at `Done` compares every logged observation against the
//! producer's ground truth. A run with no observed data at all is a hard
//! failure: it means the sink never became readable within the lag.

pub mod control;
pub mod error;
pub mod reconcile;

pub use control::{ControlLoop, ControlPhase, ControlStats, ObservationLog, ScaleUp};
pub use error::{ControlError, ControlResult};
pub use reconcile::{Mismatch, ReconciliationReport, reconcile};
