//! Run-level error types.

use thiserror::Error;

use tally_autoscale::ControlError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("producer closed without delivering ground truth")]
    ProducerClosed,

    #[error("pipeline stopped before the producer finished")]
    ConsumerClosed,

    #[error("interrupted by shutdown signal")]
    Interrupted,

    #[error(transparent)]
    Control(#[from] ControlError),
}
