//! Configuration module for the FastGPT client.
//!
//! An [`AgentConfig`] describes one agent endpoint: base URL, API key, app id
//! and generation defaults. Completeness is checked per call rather than at
//! build time, so an incomplete agent record can be loaded and fail only when
//! used.

use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::errors::{FastGptError, FastGptResult};

/// Default request timeout (60 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Longest history sent with a chat request.
pub const MAX_HISTORY_MESSAGES: usize = 12;

/// Prefix of locally generated conversation ids.
pub const LOCAL_CHAT_ID_PREFIX: &str = "local_";

/// Chat completions path, relative to the base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";

/// Chat initialization path, relative to the base URL.
pub const CHAT_INIT_PATH: &str = "core/chat/init";

/// Question suggestion path, relative to the base URL.
pub const QUESTION_GUIDE_PATH: &str = "core/ai/agent/v2/createQuestionGuide";

/// Generates a conversation id of the form `local_<millis>_<7 chars>`.
pub fn generate_chat_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();

    format!(
        "{LOCAL_CHAT_ID_PREFIX}{}_{suffix}",
        chrono::Utc::now().timestamp_millis()
    )
}

/// Shared, lazily assigned conversation id.
///
/// Clones share one cell: an id assigned through any clone is visible to all
/// of them.
#[derive(Debug, Clone, Default)]
pub struct ConversationId(Arc<RwLock<Option<String>>>);

impl ConversationId {
    /// Creates a cell holding `id`.
    pub fn new(id: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(id)))
    }

    /// Returns the current id.
    pub async fn get(&self) -> Option<String> {
        self.0.read().await.clone()
    }

    /// Replaces the id.
    pub async fn set(&self, id: impl Into<String>) {
        *self.0.write().await = Some(id.into());
    }

    /// Returns the id, generating and storing one if none is set.
    ///
    /// Two concurrent first calls may both generate; the later write wins.
    pub async fn get_or_generate(&self) -> String {
        if let Some(id) = self.get().await {
            return id;
        }

        let id = generate_chat_id();
        tracing::debug!(chat_id = %id, "Generated local conversation id");
        self.set(id.clone()).await;
        id
    }
}

/// Configuration of one agent endpoint.
#[derive(Clone)]
pub struct AgentConfig {
    /// Base URL of the API, without trailing slash.
    pub base_url: Option<String>,
    /// API key (stored securely).
    pub(crate) api_key: Option<SecretString>,
    /// App id, sent as the model name.
    pub app_id: Option<String>,
    /// Conversation id, shared with every clone of this config.
    pub conversation_id: ConversationId,
    /// Agent instructions sent as a leading system turn when the history
    /// has none.
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token limit.
    pub max_tokens: Option<u32>,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts.
    pub max_retries: u32,
    /// Custom headers to include in requests.
    pub custom_headers: Vec<(String, String)>,
}

impl AgentConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FASTGPT_BASE_URL`: API base URL, e.g. `https://api.fastgpt.in/api`
    /// - `FASTGPT_API_KEY`: API key
    /// - `FASTGPT_APP_ID`: app id
    /// - `FASTGPT_SYSTEM_PROMPT` (optional): agent instructions
    /// - `FASTGPT_TIMEOUT` (optional): request timeout in seconds
    /// - `FASTGPT_MAX_RETRIES` (optional): maximum retry attempts
    pub fn from_env() -> FastGptResult<Self> {
        let mut builder = AgentConfigBuilder::new();

        if let Ok(base_url) = std::env::var("FASTGPT_BASE_URL") {
            builder = builder.base_url(base_url);
        }

        if let Ok(api_key) = std::env::var("FASTGPT_API_KEY") {
            builder = builder.api_key(api_key);
        }

        if let Ok(app_id) = std::env::var("FASTGPT_APP_ID") {
            builder = builder.app_id(app_id);
        }

        if let Ok(prompt) = std::env::var("FASTGPT_SYSTEM_PROMPT") {
            builder = builder.system_prompt(prompt);
        }

        if let Ok(timeout_str) = std::env::var("FASTGPT_TIMEOUT") {
            if let Ok(timeout_secs) = timeout_str.parse::<u64>() {
                builder = builder.timeout(Duration::from_secs(timeout_secs));
            }
        }

        if let Ok(retries_str) = std::env::var("FASTGPT_MAX_RETRIES") {
            if let Ok(retries) = retries_str.parse::<u32>() {
                builder = builder.max_retries(retries);
            }
        }

        builder.build()
    }

    /// Checks that endpoint, API key and app id are all present.
    pub fn validate(&self) -> FastGptResult<()> {
        let mut missing = Vec::new();

        if self.base_url.as_deref().map_or(true, str::is_empty) {
            missing.push("endpoint");
        }
        if self
            .api_key
            .as_ref()
            .map_or(true, |k| k.expose_secret().is_empty())
        {
            missing.push("API key");
        }
        if self.app_id.as_deref().map_or(true, str::is_empty) {
            missing.push("app id");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(FastGptError::configuration(format!(
                "Incomplete API configuration, missing: {}",
                missing.join(", ")
            )))
        }
    }

    /// Returns the API key (exposing the secret).
    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret().as_str())
    }

    /// Returns the API key hint (last 4 characters) for debugging.
    pub fn api_key_hint(&self) -> String {
        let tail_start = self
            .api_key()
            .and_then(|key| key.char_indices().rev().nth(3).map(|(i, _)| (key, i)));

        match tail_start {
            Some((key, start)) if start > 0 => format!("...{}", &key[start..]),
            _ => "****".to_string(),
        }
    }

    /// Returns the full URL for an endpoint path.
    pub fn endpoint_url(&self, path: &str) -> FastGptResult<String> {
        let base = self
            .base_url
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| FastGptError::configuration("Base URL is not configured"))?;

        Ok(format!("{}/{}", base, path.trim_start_matches('/')))
    }

    /// Resolves the temperature for a call.
    pub fn effective_temperature(&self, options: &ChatOptions) -> f32 {
        options
            .temperature
            .or(self.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Resolves the token limit for a call.
    pub fn effective_max_tokens(&self, options: &ChatOptions) -> u32 {
        options
            .max_tokens
            .or(self.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Resolves the timeout for a call.
    pub fn effective_timeout(&self, options: &ChatOptions) -> Duration {
        options.timeout.unwrap_or(self.timeout)
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("system_prompt", &self.system_prompt.is_some())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Builder for `AgentConfig`.
#[derive(Default)]
pub struct AgentConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    app_id: Option<String>,
    conversation_id: Option<String>,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    custom_headers: Vec<(String, String)>,
}

impl AgentConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the app id.
    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Presets the conversation id.
    #[must_use]
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Sets the agent's system prompt.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the default temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the default completion token limit.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the maximum retry attempts.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Adds a custom header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the configuration.
    ///
    /// Rejects a malformed base URL or an out-of-range temperature. Missing
    /// endpoint, key or app id are reported later, per call.
    pub fn build(self) -> FastGptResult<AgentConfig> {
        let base_url = self
            .base_url
            .map(|b| b.trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty());

        if let Some(base) = &base_url {
            let parsed = url::Url::parse(base)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(FastGptError::configuration(
                    "Base URL must use http or https",
                ));
            }
            if parsed.scheme() == "http" {
                tracing::warn!(base_url = %base, "Base URL does not use HTTPS");
            }
        }

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(FastGptError::configuration(format!(
                    "Temperature must be between 0.0 and 2.0, got {t}"
                )));
            }
        }

        Ok(AgentConfig {
            base_url,
            api_key: self.api_key.map(SecretString::new),
            app_id: self.app_id,
            conversation_id: ConversationId::new(self.conversation_id),
            system_prompt: self.system_prompt.filter(|p| !p.trim().is_empty()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            custom_headers: self.custom_headers,
        })
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Temperature override.
    pub temperature: Option<f32>,
    /// Token limit override.
    pub max_tokens: Option<u32>,
    /// Timeout override.
    pub timeout: Option<Duration>,
    /// Workflow variables sent with the request.
    pub variables: Option<serde_json::Value>,
    /// Cooperative cancellation.
    pub cancel: Option<CancellationToken>,
}

impl ChatOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Overrides the token limit.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets workflow variables.
    #[must_use]
    pub fn variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns true if the attached token has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
