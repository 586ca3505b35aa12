//! tally-sink: the gated, readiness-windowed point store.
//!
//! The sink alternates between a rejecting and an accepting phase on a
//! fixed duty cycle. Writers subscribe to readiness notifications and
//! attempt their writes when one arrives; anything offered outside the
//! accepting window is refused with a "not ready" error.
//!
//! # Architecture
//!
//! ```text
//! GatedSink
//!   ├── tick(now)       ← single periodic driver, phase = elapsed mod period
//!   │     └── ReadinessHub::notify() on Rejecting → Accepting
//!   ├── accept(key, n)  ← BucketWriter, fails while rejecting / after shutdown
//!   ├── lookup(ts)      ← BucketReader, Count(n) or NoData
//!   └── shutdown()      ← ends accepting for good, drops subscriptions
//! ```

pub mod error;
pub mod phase;
pub mod readiness;
pub mod sink;

use tally_core::{BucketKey, Observation, Timestamp};

pub use error::{SinkError, SinkResult};
pub use phase::{DutyCycle, Phase};
pub use readiness::{ReadinessSubscription, ReadyToReceive};
pub use sink::{GatedSink, SinkStats};

/// Write side of a bucket store, as seen by the aggregator.
pub trait BucketWriter {
    /// Store `count` under `key`. A `NotReady`-class error means "try again
    /// on the next readiness notification".
    fn accept(&mut self, key: BucketKey, count: u64) -> SinkResult<()>;
}

/// Read side of a bucket store, as seen by the control loop.
pub trait BucketReader {
    /// Look up the bucket containing `at`.
    fn lookup(&self, at: Timestamp) -> Observation;
}
