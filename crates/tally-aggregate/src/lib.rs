//! tally-aggregate: bucket-and-hold aggregation of request counts.
//!
//! Samples are summed into one-second buckets. On each sink readiness
//! notification the aggregator offers every *completed* bucket to the
//! sink; the bucket for the current second is always held back. Buckets
//! the sink refuses stay held, totals intact, until the next notification.
//!
//! ```text
//! producer ──consume()──▶ Aggregator ──flush(sink, now)──▶ BucketWriter
//!                          open: key → total        ▲
//!                          flushed: {key}           └── ReadyToReceive
//! ```

pub mod aggregator;
pub mod error;

pub use aggregator::{Aggregator, AggregatorStats, FlushReport};
pub use error::{AggregateError, AggregateResult};
