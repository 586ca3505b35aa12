//! Aggregator error types.

use thiserror::Error;

use tally_core::BucketKey;

pub type AggregateResult<T> = Result<T, AggregateError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// The sample belongs to a bucket the sink already holds. Adding it
    /// would require re-offering an accepted key.
    #[error("late sample for already flushed bucket {key} (count {count})")]
    AlreadyFlushed { key: BucketKey, count: u64 },
}
