//! Prometheus text exposition format.
//!
//! Renders pipeline counters for scraping by a Prometheus server or for
//! dumping at the end of a run.

use std::fmt::Write;

use tally_aggregate::AggregatorStats;
use tally_autoscale::ControlStats;
use tally_sink::SinkStats;

/// Point-in-time counters for every pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub aggregator: AggregatorStats,
    pub sink: SinkStats,
    pub control: ControlStats,
    /// Buckets still held by the aggregator.
    pub open_buckets: u64,
    /// Buckets stored in the sink.
    pub stored_buckets: u64,
}

/// Render pipeline counters into Prometheus text format.
///
/// Monotonic totals are COUNTERs, held/stored bucket counts are GAUGEs.
pub fn render_prometheus(stats: &PipelineStats) -> String {
    let mut out = String::new();

    let counters: [(&str, &str, u64); 14] = [
        (
            "tally_samples_total",
            "Samples aggregated into an open bucket.",
            stats.aggregator.samples,
        ),
        (
            "tally_late_samples_total",
            "Samples dropped because their bucket was already flushed.",
            stats.aggregator.late_samples,
        ),
        (
            "tally_flush_passes_total",
            "Flush passes triggered by sink readiness.",
            stats.aggregator.flush_passes,
        ),
        (
            "tally_buckets_flushed_total",
            "Buckets handed off to the sink.",
            stats.aggregator.buckets_flushed,
        ),
        (
            "tally_rejected_handoffs_total",
            "Flush handoffs refused by the sink as not ready.",
            stats.aggregator.rejected_handoffs,
        ),
        (
            "tally_deferred_buckets_total",
            "Incomplete buckets held back by flush passes.",
            stats.aggregator.deferred,
        ),
        (
            "tally_sink_accepted_total",
            "Writes stored by the sink.",
            stats.sink.accepted,
        ),
        (
            "tally_sink_rejected_total",
            "Writes refused by the sink.",
            stats.sink.rejected,
        ),
        (
            "tally_sink_overwritten_total",
            "Accepted writes that replaced an existing bucket.",
            stats.sink.overwritten,
        ),
        (
            "tally_sink_ready_total",
            "Transitions of the sink into its accepting phase.",
            stats.sink.readiness_notifications,
        ),
        (
            "tally_polls_total",
            "Control loop polls.",
            stats.control.polls,
        ),
        (
            "tally_polls_observed_total",
            "Polls that found data for the lagged bucket.",
            stats.control.observed,
        ),
        (
            "tally_polls_no_data_total",
            "Polls that found no data for the lagged bucket.",
            stats.control.no_data,
        ),
        (
            "tally_scale_up_signals_total",
            "Scale-up signals raised.",
            stats.control.scale_ups,
        ),
    ];

    for (name, help, value) in counters {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} counter");
        let _ = writeln!(out, "{name} {value}");
    }

    let gauges = [
        (
            "tally_open_buckets",
            "Buckets held by the aggregator.",
            stats.open_buckets,
        ),
        (
            "tally_stored_buckets",
            "Buckets stored in the sink.",
            stats.stored_buckets,
        ),
    ];

    for (name, help, value) in gauges {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} gauge");
        let _ = writeln!(out, "{name} {value}");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stats() -> PipelineStats {
        PipelineStats {
            aggregator: AggregatorStats {
                samples: 40,
                late_samples: 1,
                flush_passes: 5,
                buckets_flushed: 4,
                rejected_handoffs: 2,
                deferred: 6,
            },
            sink: SinkStats {
                accepted: 4,
                rejected: 2,
                overwritten: 0,
                readiness_notifications: 5,
            },
            control: ControlStats {
                polls: 3,
                observed: 2,
                no_data: 1,
                scale_ups: 1,
            },
            open_buckets: 1,
            stored_buckets: 4,
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&PipelineStats::default());
        // Declarations are present even with nothing recorded.
        assert!(output.contains("# HELP tally_samples_total"));
        assert!(output.contains("# TYPE tally_samples_total counter"));
        assert!(output.contains("tally_samples_total 0\n"));
    }

    #[test]
    fn render_values() {
        let output = render_prometheus(&test_stats());

        assert!(output.contains("tally_samples_total 40\n"));
        assert!(output.contains("tally_rejected_handoffs_total 2\n"));
        assert!(output.contains("# TYPE tally_deferred_buckets_total counter"));
        assert!(output.contains("tally_deferred_buckets_total 6\n"));
        assert!(output.contains("tally_sink_ready_total 5\n"));
        assert!(output.contains("tally_polls_no_data_total 1\n"));
        assert!(output.contains("tally_scale_up_signals_total 1\n"));
        assert!(output.contains("# TYPE tally_open_buckets gauge"));
        assert!(output.contains("tally_stored_buckets 4\n"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&test_stats());

        // Every sample line is `name value` with a numeric value.
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split(' ');
            let name = parts.next().unwrap();
            let value = parts.next().unwrap();
            assert!(name.starts_with("tally_"), "bad name: {line}");
            assert!(value.parse::<u64>().is_ok(), "bad value: {line}");
            assert!(parts.next().is_none(), "extra fields: {line}");
        }
    }
}
