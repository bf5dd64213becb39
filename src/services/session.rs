//! Session service: chat initialization and question suggestions.
//!
//! Both calls are best effort. Any failure yields a locally built answer so a
//! chat screen can always open.

use serde_json::Map;
use std::sync::Arc;
use tracing::instrument;

use super::ServiceContext;
use crate::config::{generate_chat_id, CHAT_INIT_PATH, QUESTION_GUIDE_PATH};
use crate::errors::{FastGptError, FastGptResult};
use crate::observability::preview;
use crate::transport::{HttpRequest, HttpResponse};
use crate::types::session::{
    AppInfo, ChatConfig, ChatInitData, ChatInitResponse, QuestionGuideRequest,
    QuestionGuideResponse, QuestionGuideSettings,
};

/// Model used for question suggestions unless overridden.
pub const DEFAULT_QUESTION_GUIDE_MODEL: &str = "GPT-4o-mini";

/// Prompt used for question suggestions unless overridden.
pub const DEFAULT_QUESTION_GUIDE_PROMPT: &str =
    "You are an intelligent assistant; generate suggested questions based on the user's question";

const FALLBACK_APP_ID: &str = "fallback-app-id";
const FALLBACK_APP_NAME: &str = "AI Assistant";
const FALLBACK_MODEL: &str = "gpt-3.5-turbo";
const FALLBACK_WELCOME: &str = "How can I help you today?";

const DEFAULT_SUGGESTIONS: [&str; 5] = [
    "What features does this product have?",
    "How do I use this system?",
    "Are there any related use cases?",
    "Can you show me some examples?",
    "What are the limitations?",
];

/// Session service.
pub struct SessionService {
    ctx: Arc<ServiceContext>,
}

impl SessionService {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Initializes a chat session.
    ///
    /// Never fails: when the agent is not configured or the call does not
    /// return a usable body, a local session carrying `chat_id` (or a new
    /// local id) is returned instead.
    #[instrument(skip(self))]
    pub async fn initialize_chat(&self, chat_id: Option<&str>) -> ChatInitResponse {
        match self.fetch_init(chat_id).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "Chat initialization failed, using local session");
                self.fallback_init(chat_id)
            }
        }
    }

    async fn fetch_init(&self, chat_id: Option<&str>) -> FastGptResult<ChatInitResponse> {
        self.ctx.validate()?;

        let config = &self.ctx.config;
        let mut url = url::Url::parse(&config.endpoint_url(CHAT_INIT_PATH)?)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("appId", config.app_id.as_deref().unwrap_or_default());
            if let Some(chat_id) = chat_id {
                query.append_pair("chatId", chat_id);
            }
        }

        let mut request = HttpRequest::get(url.as_str()).with_timeout(config.timeout);
        request.headers = self.ctx.headers();

        let response = self.ctx.transport.send(request).await?;
        let body: ChatInitResponse = parse_json_body(&response)?;

        if body.code != 200 {
            return Err(FastGptError::server(
                body.code,
                format!("Chat initialization returned code {}", body.code),
            ));
        }

        Ok(body)
    }

    fn fallback_init(&self, chat_id: Option<&str>) -> ChatInitResponse {
        let config = &self.ctx.config;

        ChatInitResponse {
            code: 200,
            data: ChatInitData {
                chat_id: chat_id.map_or_else(generate_chat_id, str::to_string),
                app_id: config
                    .app_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| FALLBACK_APP_ID.to_string()),
                variables: Map::new(),
                app: AppInfo {
                    chat_config: ChatConfig {
                        question_guide: true,
                        welcome_text: FALLBACK_WELCOME.to_string(),
                        ..ChatConfig::default()
                    },
                    chat_models: vec![FALLBACK_MODEL.to_string()],
                    name: FALLBACK_APP_NAME.to_string(),
                    app_type: "chat".to_string(),
                    ..AppInfo::default()
                },
                interacts: Vec::new(),
            },
        }
    }

    /// Asks the backend for follow-up question suggestions.
    ///
    /// Uses the conversation id of the configuration, generating one if
    /// needed. Never fails: on any problem five generic suggestions are
    /// returned.
    #[instrument(skip(self))]
    pub async fn question_suggestions(
        &self,
        model: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> Vec<String> {
        match self.fetch_suggestions(model, custom_prompt).await {
            Ok(suggestions) => suggestions,
            Err(err) => {
                tracing::warn!(error = %err, "Question suggestions failed, using defaults");
                default_suggestions()
            }
        }
    }

    async fn fetch_suggestions(
        &self,
        model: Option<&str>,
        custom_prompt: Option<&str>,
    ) -> FastGptResult<Vec<String>> {
        self.ctx.validate()?;

        let config = &self.ctx.config;
        let body = QuestionGuideRequest {
            app_id: config.app_id.clone().unwrap_or_default(),
            chat_id: config.conversation_id.get_or_generate().await,
            question_guide: QuestionGuideSettings {
                open: true,
                model: model.unwrap_or(DEFAULT_QUESTION_GUIDE_MODEL).to_string(),
                custom_prompt: custom_prompt
                    .unwrap_or(DEFAULT_QUESTION_GUIDE_PROMPT)
                    .to_string(),
            },
        };

        let mut request = HttpRequest::post(config.endpoint_url(QUESTION_GUIDE_PATH)?)
            .with_body(serde_json::to_vec(&body)?)
            .with_timeout(config.timeout);
        request.headers = self.ctx.headers();

        let response = self.ctx.transport.send(request).await?;
        let body: QuestionGuideResponse = parse_json_body(&response)?;

        if body.code != 200 {
            return Err(FastGptError::server(
                body.code,
                format!("Question guide returned code {}", body.code),
            ));
        }

        Ok(body.data)
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}

/// The suggestions returned when the backend cannot be asked.
pub fn default_suggestions() -> Vec<String> {
    DEFAULT_SUGGESTIONS.iter().map(ToString::to_string).collect()
}

/// Checks status and content type, then parses the body.
fn parse_json_body<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> FastGptResult<T> {
    if !response.is_success() {
        return Err(FastGptError::server(
            response.status,
            format!("Request failed with status {}", response.status),
        ));
    }

    let is_json = response
        .content_type()
        .is_some_and(|ct| ct.contains(mime::APPLICATION_JSON.essence_str()));
    if !is_json {
        tracing::debug!(
            body = %preview(&String::from_utf8_lossy(&response.body)),
            "Expected a JSON response"
        );
        return Err(FastGptError::ContentType {
            content_type: response.content_type().unwrap_or("none").to_string(),
        });
    }

    Ok(response.json()?)
}
