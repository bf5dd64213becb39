//! Retry policy implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::errors::FastGptError;

/// Callback invoked before each retry with the 1-based retry number and the
/// error that triggered it.
pub type RetryHook = Arc<dyn Fn(u32, &FastGptError) + Send + Sync>;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry configuration.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Delay multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add jitter.
    pub jitter: bool,
    /// Called before every retry.
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter: false,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier.
    #[must_use]
    pub fn multiplier(mut self, mult: f64) -> Self {
        self.multiplier = mult;
        self
    }

    /// Sets whether to use jitter.
    #[must_use]
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the retry callback.
    #[must_use]
    pub fn on_retry(mut self, hook: impl Fn(u32, &FastGptError) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Creates a configuration with no retries.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("jitter", &self.jitter)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Retry policy with exponential backoff.
///
/// The operation is retried as a whole. When it has side effects (a streamed
/// exchange that already delivered callbacks), those effects repeat on every
/// attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates a retry policy with default configuration.
    pub fn default_policy() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes an operation with retries, returning the last error once the
    /// budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, FastGptError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FastGptError>>,
    {
        self.execute_cancelable(&CancellationToken::new(), operation)
            .await
    }

    /// Like [`execute`](Self::execute), but stops with
    /// [`FastGptError::Canceled`] once `cancel` fires: a failure seen after
    /// cancellation is not retried, and a pending backoff is cut short.
    #[instrument(skip(self, cancel, operation), fields(max_retries = self.config.max_retries))]
    pub async fn execute_cancelable<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, FastGptError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FastGptError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(_) if cancel.is_cancelled() => return Err(FastGptError::Canceled),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        if attempt > 0 {
                            tracing::warn!(
                                attempts = attempt + 1,
                                error = %err,
                                "Giving up after retries"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.calculate_delay(attempt);

                    tracing::info!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "Retrying after error"
                    );

                    if let Some(hook) = &self.config.on_retry {
                        hook(attempt + 1, &err);
                    }

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            tracing::debug!("Canceled during backoff");
                            return Err(FastGptError::Canceled);
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Calculates the delay for a retry attempt: `min(initial * multiplier^attempt, max)`.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        // 0-25% random variation
        let delay_ms = if self.config.jitter {
            let jitter = rand::random::<f64>() * 0.25;
            delay_ms * (1.0 + jitter)
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}
