//! Control loop error types.

use thiserror::Error;

use crate::control::ControlPhase;
use crate::reconcile::ReconciliationReport;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("cannot {operation} while {phase:?}")]
    UnexpectedPhase {
        operation: &'static str,
        phase: ControlPhase,
    },

    #[error("no bucket observed with data across {polled} poll(s); lag or sink timing is miscalibrated")]
    NoObservations { polled: usize },

    #[error(
        "{} of {} compared bucket(s) disagree with ground truth",
        .0.mismatches.len(),
        .0.compared
    )]
    Inconsistent(Box<ReconciliationReport>),
}
