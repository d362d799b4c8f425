//! Extremekeeper tracks the most extreme values of a sample stream in bounded memory
//!
//! The core is [`BoundedExtremeQueue`], a binary heap that retains the `limit` largest
//! ([`Orientation::Max`]) or smallest ([`Orientation::Min`]) values it has been given.
//! [`LatencyRecorder`] builds a head/tail latency report with a fixed-width histogram
//! on top of it.

mod error;
pub use error::{Error, Result};

mod priority_queue;
pub use priority_queue::{BoundedExtremeQueue, Orientation};

mod latency;
pub use latency::{LatencyBucket, LatencyConfig, LatencyRecorder, LatencySummary, MAX_BUCKETS};
