//! Resilience layer for the FastGPT client.
//!
//! A streamed exchange is retried as one unit: connect, status and content
//! type checks, and the full body read. Backoff is exponential and capped.

mod retry;

pub use retry::{RetryConfig, RetryHook, RetryPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY};
