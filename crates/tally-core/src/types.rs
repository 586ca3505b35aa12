//! Domain types for the request-count pipeline.
//!
//! All instants are milliseconds since the Unix epoch. A `BucketKey` is an
//! instant truncated to the whole second and is the only key used for
//! aggregation, storage, and lookup.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeyError, SampleError};

/// Width of one bucket in milliseconds.
pub const BUCKET_MILLIS: u64 = 1000;

// ── Time ───────────────────────────────────────────────────────────

/// A wall-clock instant in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The one-second bucket this instant falls into.
    pub const fn bucket(self) -> BucketKey {
        BucketKey(self.0 - self.0 % BUCKET_MILLIS)
    }

    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0.saturating_add(duration_millis(d)))
    }

    pub fn saturating_sub(self, d: Duration) -> Self {
        Self(self.0.saturating_sub(duration_millis(d)))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Bucket key ─────────────────────────────────────────────────────

/// An instant truncated to whole-second precision.
///
/// Built either by truncating a `Timestamp` (always valid) or from an
/// externally supplied millisecond value, which must already be aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct BucketKey(u64);

impl BucketKey {
    /// The bucket containing `ts`.
    pub const fn containing(ts: Timestamp) -> Self {
        ts.bucket()
    }

    /// Validate an externally supplied key.
    pub fn from_aligned_millis(millis: u64) -> Result<Self, KeyError> {
        if millis % BUCKET_MILLIS != 0 {
            return Err(KeyError::Misaligned(millis));
        }
        Ok(Self(millis))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * BUCKET_MILLIS)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// First instant of the bucket.
    pub const fn start(self) -> Timestamp {
        Timestamp(self.0)
    }

    pub const fn contains(self, ts: Timestamp) -> bool {
        ts.bucket().0 == self.0
    }
}

impl TryFrom<u64> for BucketKey {
    type Error = KeyError;

    fn try_from(millis: u64) -> Result<Self, Self::Error> {
        Self::from_aligned_millis(millis)
    }
}

impl From<BucketKey> for u64 {
    fn from(key: BucketKey) -> Self {
        key.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Samples ────────────────────────────────────────────────────────

/// A count sample as delivered by a producer, before validation.
///
/// Producers are external, so nothing about the payload is trusted: the
/// timestamp may be missing or negative and the count may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: Option<i64>,
    pub count: i64,
}

impl RawSample {
    /// A well-formed raw sample.
    pub fn new(timestamp: Timestamp, count: u64) -> Self {
        Self {
            timestamp: Some(i64::try_from(timestamp.as_millis()).unwrap_or(i64::MAX)),
            count: i64::try_from(count).unwrap_or(i64::MAX),
        }
    }
}

/// A validated count sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub count: u64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, count: u64) -> Self {
        Self { timestamp, count }
    }

    pub fn bucket(&self) -> BucketKey {
        self.timestamp.bucket()
    }
}

impl TryFrom<RawSample> for Sample {
    type Error = SampleError;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let millis = raw.timestamp.ok_or(SampleError::MissingTimestamp)?;
        let millis = u64::try_from(millis).map_err(|_| SampleError::NegativeTimestamp(millis))?;
        let count = u64::try_from(raw.count).map_err(|_| SampleError::NegativeCount(raw.count))?;
        Ok(Self::new(Timestamp::from_millis(millis), count))
    }
}

// ── Observations ───────────────────────────────────────────────────

/// Result of a point lookup against the sink.
///
/// `NoData` means nothing was ever stored for the bucket, which is not the
/// same thing as a stored count of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    Count(u64),
    NoData,
}

impl Observation {
    pub fn count(self) -> Option<u64> {
        match self {
            Observation::Count(n) => Some(n),
            Observation::NoData => None,
        }
    }

    pub fn has_data(self) -> bool {
        matches!(self, Observation::Count(_))
    }
}

impl From<Option<u64>> for Observation {
    fn from(count: Option<u64>) -> Self {
        count.map_or(Observation::NoData, Observation::Count)
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Count(n) => write!(f, "{n}"),
            Observation::NoData => f.write_str("no data"),
        }
    }
}

// ── Ground truth ───────────────────────────────────────────────────

/// Per-second totals as the producer actually emitted them.
///
/// Delivered once at the end of a run and used only for reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundTruth(BTreeMap<BucketKey, u64>);

impl GroundTruth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample to its bucket's total.
    pub fn record(&mut self, sample: &Sample) {
        let total = self.0.entry(sample.bucket()).or_insert(0);
        *total = total.saturating_add(sample.count);
    }

    pub fn get(&self, key: BucketKey) -> Option<u64> {
        self.0.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, BucketKey, u64> {
        self.0.iter()
    }
}

impl FromIterator<(BucketKey, u64)> for GroundTruth {
    fn from_iter<I: IntoIterator<Item = (BucketKey, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_truncates_to_whole_second() {
        assert_eq!(Timestamp::from_millis(0).bucket(), BucketKey::from_secs(0));
        assert_eq!(Timestamp::from_millis(999).bucket(), BucketKey::from_secs(0));
        assert_eq!(Timestamp::from_millis(1000).bucket(), BucketKey::from_secs(1));
        assert_eq!(
            Timestamp::from_millis(1_670_946_352_424).bucket().as_millis(),
            1_670_946_352_000
        );
    }

    #[test]
    fn misaligned_key_rejected() {
        assert_eq!(
            BucketKey::from_aligned_millis(1500),
            Err(KeyError::Misaligned(1500))
        );
        assert_eq!(
            BucketKey::from_aligned_millis(2000).unwrap(),
            BucketKey::from_secs(2)
        );
    }

    #[test]
    fn key_contains_its_second_only() {
        let key = BucketKey::from_secs(3);
        assert!(key.contains(Timestamp::from_millis(3000)));
        assert!(key.contains(Timestamp::from_millis(3999)));
        assert!(!key.contains(Timestamp::from_millis(4000)));
        assert!(!key.contains(Timestamp::from_millis(2999)));
    }

    #[test]
    fn saturating_sub_clamps_at_epoch() {
        let ts = Timestamp::from_millis(1000);
        assert_eq!(ts.saturating_sub(Duration::from_millis(2500)).as_millis(), 0);
        assert_eq!(
            Timestamp::from_millis(5000)
                .saturating_sub(Duration::from_millis(2500))
                .as_millis(),
            2500
        );
    }

    #[test]
    fn duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(2500)), 2500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
        assert_eq!(
            Timestamp::from_millis(10).saturating_add(Duration::MAX),
            Timestamp::from_millis(u64::MAX)
        );
    }

    #[test]
    fn raw_sample_validation() {
        let ok = RawSample {
            timestamp: Some(1050),
            count: 200,
        };
        assert_eq!(
            Sample::try_from(ok).unwrap(),
            Sample::new(Timestamp::from_millis(1050), 200)
        );

        let missing = RawSample {
            timestamp: None,
            count: 1,
        };
        assert_eq!(Sample::try_from(missing), Err(SampleError::MissingTimestamp));

        let negative_ts = RawSample {
            timestamp: Some(-5),
            count: 1,
        };
        assert_eq!(
            Sample::try_from(negative_ts),
            Err(SampleError::NegativeTimestamp(-5))
        );

        let negative_count = RawSample {
            timestamp: Some(10),
            count: -3,
        };
        assert_eq!(
            Sample::try_from(negative_count),
            Err(SampleError::NegativeCount(-3))
        );
    }

    #[test]
    fn observation_distinguishes_zero_from_absent() {
        assert_eq!(Observation::from(Some(0)), Observation::Count(0));
        assert_eq!(Observation::from(None), Observation::NoData);
        assert_ne!(Observation::Count(0), Observation::NoData);
        assert!(!Observation::NoData.has_data());
    }

    #[test]
    fn ground_truth_sums_per_second() {
        let mut truth = GroundTruth::new();
        truth.record(&Sample::new(Timestamp::from_millis(0), 100));
        truth.record(&Sample::new(Timestamp::from_millis(50), 200));
        truth.record(&Sample::new(Timestamp::from_millis(1200), 7));

        assert_eq!(truth.get(BucketKey::from_secs(0)), Some(300));
        assert_eq!(truth.get(BucketKey::from_secs(1)), Some(7));
        assert_eq!(truth.get(BucketKey::from_secs(2)), None);
    }

    #[test]
    fn ground_truth_json_uses_string_keys() {
        let truth: GroundTruth = [(BucketKey::from_secs(1), 500)].into_iter().collect();
        let json = serde_json::to_string(&truth).unwrap();
        assert_eq!(json, r#"{"1000":500}"#);

        let back: GroundTruth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, truth);

        let misaligned = serde_json::from_str::<GroundTruth>(r#"{"1001":500}"#);
        assert!(misaligned.is_err());
    }
}
