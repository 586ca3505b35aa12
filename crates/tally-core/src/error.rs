//! Error types for input validation and configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A raw sample that cannot be aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("sample has no timestamp")]
    MissingTimestamp,

    #[error("sample timestamp is negative: {0}")]
    NegativeTimestamp(i64),

    #[error("sample count is negative: {0}")]
    NegativeCount(i64),
}

/// An externally supplied bucket key that is not a whole second.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("bucket key {0} is not aligned to a whole second")]
    Misaligned(u64),
}

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating `tally.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("{field}: invalid duration {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("autoscale.lag of {lag:?} must exceed {minimum:?} (one rejecting phase plus one flush interval)")]
    LagTooShort { lag: Duration, minimum: Duration },
}
