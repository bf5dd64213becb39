//! Service implementations for the FastGPT API.
//!
//! [`ChatService`] drives streamed and non-streamed chat turns,
//! [`SessionService`] covers session initialization and question suggestions,
//! and [`EventDispatcher`] routes decoded frames to callbacks.

mod chat;
mod dispatch;
mod session;

pub use chat::{
    ChatService, StreamOutcome, CONNECTION_FALLBACK, DEGRADED_MESSAGE, PROCESSING_FALLBACK,
    SERVER_FALLBACK,
};
pub use dispatch::EventDispatcher;
pub use session::{
    default_suggestions, SessionService, DEFAULT_QUESTION_GUIDE_MODEL, DEFAULT_QUESTION_GUIDE_PROMPT,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::AgentConfig;
use crate::errors::FastGptResult;
use crate::observability::MetricsCollector;
use crate::resilience::RetryPolicy;
use crate::transport::HttpTransport;

/// State shared by the services of one client.
pub(crate) struct ServiceContext {
    pub(crate) config: AgentConfig,
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) retry: RetryPolicy,
    pub(crate) metrics: Arc<dyn MetricsCollector>,
    pub(crate) dispatcher: EventDispatcher,
}

impl ServiceContext {
    /// Checks that the agent can be called at all.
    pub(crate) fn validate(&self) -> FastGptResult<()> {
        self.config.validate()?;
        self.auth.validate()
    }

    /// JSON content type, credentials and custom headers.
    pub(crate) fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        for (name, value) in &self.config.custom_headers {
            headers.insert(name.clone(), value.clone());
        }

        self.auth.apply_auth(&mut headers);
        headers
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("config", &self.config)
            .field("retry", self.retry.config())
            .finish_non_exhaustive()
    }
}
