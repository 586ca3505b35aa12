//! End-of-run reconciliation of observed counts against ground truth.

use std::fmt;

use serde::Serialize;

use tally_core::{BucketKey, GroundTruth, Observation};

use crate::control::ObservationLog;
use crate::error::{ControlError, ControlResult};

/// One bucket whose observed count differs from what was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub key: BucketKey,
    pub expected: u64,
    pub observed: Observation,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bucket {}: expected {}, observed {}",
            self.key, self.expected, self.observed
        )
    }
}

/// Everything an operator needs to judge a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub observations: ObservationLog,
    pub ground_truth: GroundTruth,
    pub mismatches: Vec<Mismatch>,
    /// Observed buckets that the ground truth also covers.
    pub compared: usize,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Turn any mismatch into a run-level error carrying this report.
    pub fn ensure_consistent(self) -> ControlResult<Self> {
        if self.is_consistent() {
            Ok(self)
        } else {
            Err(ControlError::Inconsistent(Box::new(self)))
        }
    }
}

/// Compare every observed bucket with the ground truth.
///
/// Buckets the ground truth does not mention are skipped, as are ground
/// truth buckets that were never observed. A `NoData` observation counts
/// as zero. Fails when no observation carried data.
pub fn reconcile(
    observations: &ObservationLog,
    ground_truth: GroundTruth,
) -> ControlResult<ReconciliationReport> {
    if !observations.values().any(|o| o.has_data()) {
        return Err(ControlError::NoObservations {
            polled: observations.len(),
        });
    }

    let mut mismatches = Vec::new();
    let mut compared = 0;

    for (key, observed) in observations {
        let Some(expected) = ground_truth.get(*key) else {
            continue;
        };
        compared += 1;
        if observed.count().unwrap_or(0) != expected {
            mismatches.push(Mismatch {
                key: *key,
                expected,
                observed: *observed,
            });
        }
    }

    Ok(ReconciliationReport {
        observations: observations.clone(),
        ground_truth,
        mismatches,
        compared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: u64) -> BucketKey {
        BucketKey::from_secs(secs)
    }

    fn truth(entries: &[(u64, u64)]) -> GroundTruth {
        entries.iter().map(|(s, n)| (t(*s), *n)).collect()
    }

    fn log(entries: &[(u64, Observation)]) -> ObservationLog {
        entries.iter().map(|(s, o)| (t(*s), *o)).collect()
    }

    #[test]
    fn unobserved_truth_is_not_a_mismatch() {
        let report = reconcile(
            &log(&[(1, Observation::Count(500))]),
            truth(&[(1, 500), (2, 1200)]),
        )
        .unwrap();

        assert!(report.mismatches.is_empty());
        assert_eq!(report.compared, 1);
        assert!(report.ensure_consistent().is_ok());
    }

    #[test]
    fn drift_reported_with_context() {
        let report = reconcile(&log(&[(1, Observation::Count(480))]), truth(&[(1, 500)])).unwrap();

        assert_eq!(
            report.mismatches,
            vec![Mismatch {
                key: t(1),
                expected: 500,
                observed: Observation::Count(480),
            }]
        );
        assert_eq!(
            report.mismatches[0].to_string(),
            "bucket 1000: expected 500, observed 480"
        );

        let err = report.ensure_consistent().unwrap_err();
        assert_eq!(
            err.to_string(),
            "1 of 1 compared bucket(s) disagree with ground truth"
        );
        match err {
            ControlError::Inconsistent(report) => assert_eq!(report.mismatches.len(), 1),
            other => panic!("expected Inconsistent, got {other:?}"),
        }
    }

    #[test]
    fn observations_outside_truth_are_skipped() {
        let report = reconcile(
            &log(&[(0, Observation::NoData), (1, Observation::Count(10))]),
            truth(&[(5, 99)]),
        )
        .unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.compared, 0);
    }

    #[test]
    fn no_data_compares_as_zero() {
        let consistent = reconcile(
            &log(&[(1, Observation::NoData), (2, Observation::Count(7))]),
            truth(&[(1, 0), (2, 7)]),
        )
        .unwrap();
        assert!(consistent.is_consistent());

        let missing = reconcile(
            &log(&[(1, Observation::NoData), (2, Observation::Count(7))]),
            truth(&[(1, 500), (2, 7)]),
        )
        .unwrap();
        assert_eq!(missing.mismatches.len(), 1);
        assert_eq!(missing.mismatches[0].observed, Observation::NoData);
    }

    #[test]
    fn empty_log_is_fatal() {
        let err = reconcile(&ObservationLog::new(), truth(&[(1, 5)])).unwrap_err();
        assert!(matches!(err, ControlError::NoObservations { polled: 0 }));
    }

    #[test]
    fn log_without_data_is_fatal() {
        let err = reconcile(
            &log(&[(1, Observation::NoData), (2, Observation::NoData)]),
            truth(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, ControlError::NoObservations { polled: 2 }));
    }

    #[test]
    fn report_serializes_for_operators() {
        let report = reconcile(&log(&[(1, Observation::Count(480))]), truth(&[(1, 500)])).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["observations"]["1000"]["count"], 480);
        assert_eq!(json["ground_truth"]["1000"], 500);
        assert_eq!(json["mismatches"][0]["expected"], 500);
        assert_eq!(json["compared"], 1);
    }
}
