//! Metrics collection for streamed chat exchanges.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::types::events::EventType;

/// Bucket for frames whose event name is not recognized.
const OTHER_EVENT_BUCKET: &str = "other";

/// How a streamed exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The body was read to the end.
    Finished,
    /// A fallback answer was delivered.
    Degraded,
    /// The caller canceled.
    Canceled,
}

/// Metrics collector interface.
pub trait MetricsCollector: Send + Sync {
    /// Records the start of a streamed exchange.
    fn record_stream_started(&self);

    /// Records how a streamed exchange ended and how long it took.
    fn record_stream_end(&self, end: StreamEnd, duration: Duration);

    /// Records one dispatched frame.
    fn record_frame(&self, event_type: &str);

    /// Records one retry.
    fn record_retry(&self, error_kind: &str);

    /// Records an error frame reported by the workflow.
    fn record_upstream_error(&self);

    /// Gets current metrics.
    fn get_metrics(&self) -> StreamMetrics;

    /// Resets all metrics.
    fn reset(&self);
}

/// Stream metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetrics {
    /// Exchanges started.
    pub streams_started: u64,
    /// Exchanges that read the body to the end.
    pub streams_finished: u64,
    /// Exchanges that ended with a fallback answer.
    pub streams_degraded: u64,
    /// Exchanges canceled by the caller.
    pub streams_canceled: u64,
    /// Frames dispatched.
    pub frames: u64,
    /// Retries performed.
    pub retries: u64,
    /// Error frames reported by the workflow.
    pub upstream_errors: u64,
    /// Total duration of ended exchanges in milliseconds.
    pub total_duration_ms: u64,
    /// Frames per event type.
    pub frames_by_event: HashMap<String, u64>,
    /// Retries per error kind.
    pub retries_by_kind: HashMap<String, u64>,
}

impl StreamMetrics {
    /// Number of exchanges that reached a terminal state.
    pub fn streams_ended(&self) -> u64 {
        self.streams_finished + self.streams_degraded + self.streams_canceled
    }

    /// Share of ended exchanges that degraded, as a percentage.
    pub fn degraded_rate(&self) -> f64 {
        let ended = self.streams_ended();
        if ended == 0 {
            0.0
        } else {
            (self.streams_degraded as f64 / ended as f64) * 100.0
        }
    }

    /// Average exchange duration in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        let ended = self.streams_ended();
        if ended == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / ended as f64
        }
    }
}

/// Default metrics collector implementation.
#[derive(Default)]
pub struct DefaultMetricsCollector {
    streams_started: AtomicU64,
    streams_finished: AtomicU64,
    streams_degraded: AtomicU64,
    streams_canceled: AtomicU64,
    frames: AtomicU64,
    retries: AtomicU64,
    upstream_errors: AtomicU64,
    total_duration_ms: AtomicU64,
    frames_by_event: RwLock<HashMap<String, u64>>,
    retries_by_kind: RwLock<HashMap<String, u64>>,
}

impl DefaultMetricsCollector {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsCollector for DefaultMetricsCollector {
    fn record_stream_started(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stream_end(&self, end: StreamEnd, duration: Duration) {
        let counter = match end {
            StreamEnd::Finished => &self.streams_finished,
            StreamEnd::Degraded => &self.streams_degraded,
            StreamEnd::Canceled => &self.streams_canceled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_frame(&self, event_type: &str) {
        self.frames.fetch_add(1, Ordering::Relaxed);

        // Unknown names come from the server, so they share one key.
        let key = match EventType::from_name(event_type) {
            EventType::Other(_) => OTHER_EVENT_BUCKET,
            _ => event_type,
        };

        if let Ok(mut by_event) = self.frames_by_event.write() {
            *by_event.entry(key.to_string()).or_insert(0) += 1;
        }
    }

    fn record_retry(&self, error_kind: &str) {
        self.retries.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.retries_by_kind.write() {
            *by_kind.entry(error_kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn get_metrics(&self) -> StreamMetrics {
        StreamMetrics {
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_finished: self.streams_finished.load(Ordering::Relaxed),
            streams_degraded: self.streams_degraded.load(Ordering::Relaxed),
            streams_canceled: self.streams_canceled.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            frames_by_event: self
                .frames_by_event
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
            retries_by_kind: self
                .retries_by_kind
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.streams_started,
            &self.streams_finished,
            &self.streams_degraded,
            &self.streams_canceled,
            &self.frames,
            &self.retries,
            &self.upstream_errors,
            &self.total_duration_ms,
        ] {
            counter.store(0, Ordering::Relaxed);
        }

        if let Ok(mut by_event) = self.frames_by_event.write() {
            by_event.clear();
        }
        if let Ok(mut by_kind) = self.retries_by_kind.write() {
            by_kind.clear();
        }
    }
}

impl std::fmt::Debug for DefaultMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMetricsCollector")
            .field("streams_started", &self.streams_started.load(Ordering::Relaxed))
            .field("frames", &self.frames.load(Ordering::Relaxed))
            .field("retries", &self.retries.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
