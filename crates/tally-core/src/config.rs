//! tally.toml configuration parser.
//!
//! Every field is optional; missing fields take the defaults below, which
//! reproduce the reference timing of the pipeline (400ms accepting / 600ms
//! rejecting sink, 2.5s poll lag, threshold 3000).
//!
//! ```toml
//! [sink]
//! accepting = "400ms"
//! rejecting = "600ms"
//!
//! [autoscale]
//! lag = "2500ms"
//! threshold = 3000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sink: SinkConfig,
    pub autoscale: AutoscaleConfig,
    pub producer: ProducerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Length of the accepting phase.
    pub accepting: String,
    /// Length of the rejecting phase (the cycle starts here).
    pub rejecting: String,
    /// How often the duty-cycle phase is recomputed.
    pub tick: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            accepting: "400ms".to_string(),
            rejecting: "600ms".to_string(),
            tick: "25ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub startup_delay: String,
    pub poll_interval: String,
    /// How far behind "now" the control loop looks.
    pub lag: String,
    /// Counts strictly above this raise a scale-up signal.
    pub threshold: u64,
    /// Settling time between end of run and reconciliation.
    pub drain_grace: String,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            startup_delay: "1s".to_string(),
            poll_interval: "1s".to_string(),
            lag: "2500ms".to_string(),
            threshold: 3000,
            drain_grace: "500ms".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub sample_interval: String,
    pub run_for: String,
    /// Sample counts are whole multiples of this.
    pub count_unit: u64,
    /// Largest multiple of `count_unit` a sample may carry.
    pub max_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub channel_capacity: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            sample_interval: "125ms".to_string(),
            run_for: "5s".to_string(),
            count_unit: 100,
            max_units: 9,
            seed: None,
            channel_capacity: 1024,
        }
    }
}

// ── Resolved settings ──────────────────────────────────────────────

/// Sink duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkTiming {
    pub accepting: Duration,
    pub rejecting: Duration,
    pub tick: Duration,
}

impl SinkTiming {
    /// Full cycle length (accepting + rejecting).
    pub fn period(&self) -> Duration {
        self.accepting + self.rejecting
    }

    /// Smallest lag at which a completed bucket is guaranteed to have had
    /// a flush opportunity: one rejecting phase plus one full cycle, since
    /// the aggregator flushes once per cycle.
    pub fn minimum_lag(&self) -> Duration {
        self.rejecting + self.period()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTiming {
    pub startup_delay: Duration,
    pub poll_interval: Duration,
    pub lag: Duration,
    pub threshold: u64,
    pub drain_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerPlan {
    pub sample_interval: Duration,
    pub run_for: Duration,
    pub count_unit: u64,
    pub max_units: u64,
    pub seed: Option<u64>,
    pub channel_capacity: usize,
}

/// Validated, typed configuration for a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub sink: SinkTiming,
    pub control: ControlTiming,
    pub producer: ProducerPlan,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sink: SinkTiming {
                accepting: Duration::from_millis(400),
                rejecting: Duration::from_millis(600),
                tick: Duration::from_millis(25),
            },
            control: ControlTiming {
                startup_delay: Duration::from_secs(1),
                poll_interval: Duration::from_secs(1),
                lag: Duration::from_millis(2500),
                threshold: 3000,
                drain_grace: Duration::from_millis(500),
            },
            producer: ProducerPlan {
                sample_interval: Duration::from_millis(125),
                run_for: Duration::from_secs(5),
                count_unit: 100,
                max_units: 9,
                seed: None,
                channel_capacity: 1024,
            },
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parse every duration and check the timing constraints.
    pub fn resolve(&self) -> ConfigResult<Settings> {
        let sink = SinkTiming {
            accepting: nonzero("sink.accepting", &self.sink.accepting)?,
            rejecting: nonzero("sink.rejecting", &self.sink.rejecting)?,
            tick: nonzero("sink.tick", &self.sink.tick)?,
        };

        let control = ControlTiming {
            startup_delay: duration("autoscale.startup_delay", &self.autoscale.startup_delay)?,
            poll_interval: nonzero("autoscale.poll_interval", &self.autoscale.poll_interval)?,
            lag: duration("autoscale.lag", &self.autoscale.lag)?,
            threshold: self.autoscale.threshold,
            drain_grace: duration("autoscale.drain_grace", &self.autoscale.drain_grace)?,
        };

        let minimum = sink.minimum_lag();
        if control.lag <= minimum {
            return Err(ConfigError::LagTooShort {
                lag: control.lag,
                minimum,
            });
        }

        if self.producer.channel_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "producer.channel_capacity",
            });
        }

        let producer = ProducerPlan {
            sample_interval: nonzero("producer.sample_interval", &self.producer.sample_interval)?,
            run_for: duration("producer.run_for", &self.producer.run_for)?,
            count_unit: self.producer.count_unit,
            max_units: self.producer.max_units,
            seed: self.producer.seed,
            channel_capacity: self.producer.channel_capacity,
        };

        Ok(Settings {
            sink,
            control,
            producer,
        })
    }
}

fn duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

fn nonzero(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let d = duration(field, value)?;
    if d.is_zero() {
        return Err(ConfigError::Zero { field });
    }
    Ok(d)
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
