//! FastGPT API client.
//!
//! Provides the main client interface: one client per agent endpoint, with a
//! chat service for streamed and non-streamed turns and a session service.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthProvider, BearerAuth};
use crate::config::{AgentConfig, AgentConfigBuilder};
use crate::errors::{FastGptError, FastGptResult};
use crate::observability::{DefaultMetricsCollector, MetricsCollector, StreamMetrics};
use crate::resilience::{RetryConfig, RetryPolicy};
use crate::services::{ChatService, EventDispatcher, ServiceContext, SessionService};
use crate::transport::{HttpTransport, HttpTransportImpl};

/// The main FastGPT client.
///
/// # Example
///
/// ```rust,no_run
/// use fastgpt_client::{Callbacks, ChatOptions, ChatTurn, FastGptClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = FastGptClient::builder()
///         .base_url("https://api.fastgpt.in/api")
///         .api_key("fastgpt-your-key")
///         .app_id("your-app-id")
///         .build()?;
///
///     let callbacks = Callbacks::new()
///         .with_chunk(|text| print!("{text}"))
///         .with_finish(|| println!());
///
///     let outcome = client
///         .chat()
///         .send_chat(&[ChatTurn::user("Hello!")], ChatOptions::new(), &callbacks)
///         .await?;
///     assert!(!outcome.is_canceled());
///     Ok(())
/// }
/// ```
pub struct FastGptClient {
    ctx: Arc<ServiceContext>,
    chat_service: ChatService,
    session_service: SessionService,
}

impl FastGptClient {
    /// Creates a new client builder.
    pub fn builder() -> FastGptClientBuilder {
        FastGptClientBuilder::new()
    }

    /// Creates a client from environment variables.
    ///
    /// See [`AgentConfig::from_env`].
    pub fn from_env() -> FastGptResult<Self> {
        FastGptClientBuilder::new()
            .config(AgentConfig::from_env()?)
            .build()
    }

    /// Creates a client for an agent configuration.
    pub fn new(config: AgentConfig) -> FastGptResult<Self> {
        FastGptClientBuilder::new().config(config).build()
    }

    /// Returns the chat service.
    pub fn chat(&self) -> &ChatService {
        &self.chat_service
    }

    /// Returns the session service.
    pub fn session(&self) -> &SessionService {
        &self.session_service
    }

    /// Returns the configuration.
    ///
    /// The conversation id cell is shared with the client, so an id generated
    /// by the first turn is visible here.
    pub fn config(&self) -> &AgentConfig {
        &self.ctx.config
    }

    /// Returns a snapshot of the stream metrics.
    pub fn metrics(&self) -> StreamMetrics {
        self.ctx.metrics.get_metrics()
    }

    /// Returns the metrics collector.
    pub fn metrics_collector(&self) -> &Arc<dyn MetricsCollector> {
        &self.ctx.metrics
    }
}

impl std::fmt::Debug for FastGptClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastGptClient")
            .field("config", &self.ctx.config)
            .finish_non_exhaustive()
    }
}

/// Builder for the FastGPT client.
pub struct FastGptClientBuilder {
    config_builder: AgentConfigBuilder,
    config: Option<AgentConfig>,
    transport: Option<Arc<dyn HttpTransport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    retry: Option<RetryConfig>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl FastGptClientBuilder {
    /// Creates a new client builder.
    pub fn new() -> Self {
        Self {
            config_builder: AgentConfigBuilder::new(),
            config: None,
            transport: None,
            auth: None,
            retry: None,
            metrics: None,
        }
    }

    /// Uses an existing configuration. Overrides the individual setters.
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(base_url);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.api_key(api_key);
        self
    }

    /// Sets the app id.
    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.app_id(app_id);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Sets the maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config_builder = self.config_builder.max_retries(retries);
        self
    }

    /// Sets a custom transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets a custom auth provider.
    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the retry configuration. Its `max_retries` wins over the
    /// configuration's.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Sets a custom metrics collector.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the client.
    ///
    /// Succeeds for an incomplete configuration; missing endpoint, key or app
    /// id are reported when a call is made.
    pub fn build(self) -> FastGptResult<FastGptClient> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_builder.build()?,
        };

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransportImpl::new(config.timeout).map_err(|e| {
                FastGptError::configuration(format!("Failed to create HTTP client: {e}"))
            })?),
        };

        let auth: Arc<dyn AuthProvider> = match self.auth {
            Some(a) => a,
            None => Arc::new(BearerAuth::new(config.api_key().unwrap_or_default())),
        };

        let metrics: Arc<dyn MetricsCollector> = self
            .metrics
            .unwrap_or_else(|| Arc::new(DefaultMetricsCollector::new()));

        let retry = RetryPolicy::new(with_retry_metrics(
            self.retry
                .unwrap_or_else(|| RetryConfig::new().max_retries(config.max_retries)),
            Arc::clone(&metrics),
        ));

        let ctx = Arc::new(ServiceContext {
            config,
            transport,
            auth,
            retry,
            dispatcher: EventDispatcher::with_metrics(Arc::clone(&metrics)),
            metrics,
        });

        Ok(FastGptClient {
            chat_service: ChatService::new(Arc::clone(&ctx)),
            session_service: SessionService::new(Arc::clone(&ctx)),
            ctx,
        })
    }
}

impl Default for FastGptClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts retries before handing over to the caller's hook.
fn with_retry_metrics(mut config: RetryConfig, metrics: Arc<dyn MetricsCollector>) -> RetryConfig {
    let user_hook = config.on_retry.take();

    config.on_retry = Some(Arc::new(move |attempt, error: &FastGptError| {
        metrics.record_retry(error.kind());
        if let Some(hook) = &user_hook {
            hook(attempt, error);
        }
    }));

    config
}
