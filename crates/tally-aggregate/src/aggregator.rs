//! Bucket aggregator: sums samples per second and hands completed
//! buckets to a `BucketWriter`.
//!
//! A bucket is *open* from its first sample until the sink accepts it.
//! Once accepted the key is remembered as flushed and never reopened, so
//! the sink sees each key at most once.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use tally_core::{BucketKey, Sample, Timestamp};
use tally_sink::{BucketWriter, SinkError};

use crate::error::{AggregateError, AggregateResult};

/// Counters for metrics exposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Samples added to an open bucket.
    pub samples: u64,
    /// Samples refused because their bucket was already flushed.
    pub late_samples: u64,
    /// Calls to `flush`.
    pub flush_passes: u64,
    /// Buckets the sink accepted.
    pub buckets_flushed: u64,
    /// Handoffs the sink refused as not ready.
    pub rejected_handoffs: u64,
    /// Incomplete buckets held back, summed over flush passes.
    pub deferred: u64,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Buckets accepted by the sink, oldest first.
    pub flushed: Vec<(BucketKey, u64)>,
    /// Incomplete buckets (current second or later) that were not offered.
    pub deferred: usize,
    /// Completed buckets still held after a rejection.
    pub retained: usize,
    /// Why the pass stopped early, if it did.
    pub rejection: Option<SinkError>,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    /// Open buckets: key → running total.
    open: BTreeMap<BucketKey, u64>,
    /// Keys the sink has accepted.
    flushed: BTreeSet<BucketKey>,
    stats: AggregatorStats,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample to its bucket's running total.
    ///
    /// Arrival order does not matter as long as the bucket is still open.
    /// Returns the bucket the sample landed in.
    pub fn consume(&mut self, sample: Sample) -> AggregateResult<BucketKey> {
        let key = sample.bucket();
        if self.flushed.contains(&key) {
            self.stats.late_samples += 1;
            return Err(AggregateError::AlreadyFlushed {
                key,
                count: sample.count,
            });
        }

        let total = self.open.entry(key).or_insert(0);
        *total = total.saturating_add(sample.count);
        self.stats.samples += 1;
        debug!(%key, count = sample.count, total = *total, "sample aggregated");
        Ok(key)
    }

    /// Offer every completed bucket to `sink`.
    ///
    /// Buckets at or after `now`'s second are incomplete and never
    /// offered. The pass stops at the first refusal: the refused bucket
    /// and everything after it stay held for the next readiness signal.
    pub fn flush<W: BucketWriter + ?Sized>(&mut self, sink: &mut W, now: Timestamp) -> FlushReport {
        self.stats.flush_passes += 1;
        let current = now.bucket();

        let completed: Vec<(BucketKey, u64)> = self
            .open
            .range(..current)
            .map(|(key, total)| (*key, *total))
            .collect();

        let mut report = FlushReport {
            deferred: self.open.len() - completed.len(),
            ..FlushReport::default()
        };

        for (key, count) in completed {
            match sink.accept(key, count) {
                Ok(()) => {
                    self.open.remove(&key);
                    self.flushed.insert(key);
                    self.stats.buckets_flushed += 1;
                    debug!(%key, count, "bucket flushed");
                    report.flushed.push((key, count));
                }
                Err(e) => {
                    self.stats.rejected_handoffs += 1;
                    report.retained = self.open.range(..current).count();
                    report.rejection = Some(e);
                    debug!(
                        %key,
                        error = %e,
                        retained = report.retained,
                        "flush rejected, holding buckets"
                    );
                    break;
                }
            }
        }

        self.stats.deferred += report.deferred as u64;
        if report.deferred > 0 {
            debug!(%current, deferred = report.deferred, "incomplete buckets held back");
        }
        report
    }

    /// Running total for an open bucket.
    pub fn held(&self, key: BucketKey) -> Option<u64> {
        self.open.get(&key).copied()
    }

    pub fn open_buckets(&self) -> usize {
        self.open.len()
    }

    pub fn is_flushed(&self, key: BucketKey) -> bool {
        self.flushed.contains(&key)
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }
}
