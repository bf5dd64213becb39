//! Chat request and completion types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user.
    User,
    /// Model output.
    Assistant,
    /// System instructions.
    System,
}

/// One turn of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who produced the turn.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl ChatTurn {
    /// Creates a turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Outbound chat request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// App id, sent as the model name.
    pub model: String,

    /// Conversation id.
    #[serde(rename = "chatId")]
    pub chat_id: String,

    /// Whether the response is streamed.
    pub stream: bool,

    /// Ask for intermediate workflow frames. Always true when streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<bool>,

    /// Conversation history.
    pub messages: Vec<ChatTurn>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Completion token limit.
    pub max_tokens: u32,

    /// Workflow variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

/// Non-streaming chat completion.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatCompletion {
    /// Completion id.
    pub id: String,
    /// Object type.
    pub object: String,
    /// Unix timestamp.
    pub created: i64,
    /// Model name.
    pub model: String,
    /// Completion choices.
    pub choices: Vec<CompletionChoice>,
    /// Token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Returns the content of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A completion choice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CompletionChoice {
    /// Choice index.
    pub index: u32,
    /// Generated message.
    pub message: CompletionMessage,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Message inside a completion choice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CompletionMessage {
    /// Role name as sent by the server.
    pub role: String,
    /// Text content.
    pub content: String,
}

/// Token usage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Usage {
    /// Prompt tokens.
    pub prompt_tokens: u32,
    /// Completion tokens.
    pub completion_tokens: u32,
    /// Total tokens.
    pub total_tokens: u32,
}

/// Extracts `choices[0].delta.content` from a chat-completion chunk.
///
/// Returns `None` when the value does not have the delta shape at all and
/// `Some("")` when it does but carries no text.
pub fn completion_delta(value: &Value) -> Option<&str> {
    let delta = value.get("choices")?.get(0)?.get("delta")?;
    Some(delta.get("content").and_then(Value::as_str).unwrap_or_default())
}
