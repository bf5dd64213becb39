//! Chat session payloads: initialization and question suggestions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response of the chat initialization endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatInitResponse {
    /// Status code inside the body.
    pub code: u16,
    /// Session data.
    pub data: ChatInitData,
}

/// Session data returned on initialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatInitData {
    /// Conversation id.
    pub chat_id: String,
    /// App id.
    pub app_id: String,
    /// Current workflow variables.
    pub variables: Map<String, Value>,
    /// App description.
    pub app: AppInfo,
    /// Pending interactive nodes.
    pub interacts: Vec<Value>,
}

/// App description.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppInfo {
    /// Chat behavior settings.
    pub chat_config: ChatConfig,
    /// Models the app may use.
    pub chat_models: Vec<String>,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: String,
    /// Short introduction.
    pub intro: String,
    /// App kind.
    #[serde(rename = "type")]
    pub app_type: String,
    /// Plugin inputs.
    pub plugin_inputs: Vec<Value>,
}

/// Chat behavior settings of an app.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatConfig {
    /// Whether question suggestions are enabled.
    pub question_guide: bool,
    /// Greeting shown before the first turn.
    pub welcome_text: String,
    /// Instructions shown to the user.
    pub instruction: String,
    /// Declared workflow variables.
    pub variables: Vec<Value>,
    /// Settings not modeled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Question suggestion request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGuideRequest {
    /// App id.
    pub app_id: String,
    /// Conversation id.
    pub chat_id: String,
    /// Generation settings.
    pub question_guide: QuestionGuideSettings,
}

/// Question suggestion settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGuideSettings {
    /// Whether generation is enabled.
    pub open: bool,
    /// Model that generates the suggestions.
    pub model: String,
    /// Prompt used for generation.
    pub custom_prompt: String,
}

/// Question suggestion response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QuestionGuideResponse {
    /// Status code inside the body.
    pub code: u16,
    /// Suggested questions.
    pub data: Vec<String>,
}
