//! Observability module for the FastGPT client.
//!
//! Logging goes through `tracing`; [`init_tracing`] installs a subscriber for
//! binaries and tests that do not bring their own. Stream counters live behind
//! the [`MetricsCollector`] trait.

mod logging;
mod metrics;

pub use logging::{init_tracing, preview, redact, LogConfig, LogLevel, PREVIEW_LIMIT};
pub use metrics::{DefaultMetricsCollector, MetricsCollector, StreamEnd, StreamMetrics};

use std::time::{Duration, Instant};

/// Timer for measuring one exchange.
#[derive(Debug)]
pub struct RequestTimer {
    start: Instant,
    operation: &'static str,
}

impl RequestTimer {
    /// Starts a timer.
    pub fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Returns the elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the operation name.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}
