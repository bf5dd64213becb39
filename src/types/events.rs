//! Workflow event vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Event types the backend tags frames with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Answer text delta.
    Answer,
    /// Answer text delta from a fast-reply node.
    FastAnswer,
    /// Workflow node status change.
    FlowNodeStatus,
    /// Legacy module status.
    ModuleStatus,
    /// Legacy module start.
    ModuleStart,
    /// Legacy module end.
    ModuleEnd,
    /// Full per-node responses at the end of a run.
    FlowResponses,
    /// Reasoning content.
    Thinking,
    /// Reasoning started.
    ThinkingStart,
    /// Reasoning finished.
    ThinkingEnd,
    /// Tool invocation.
    ToolCall,
    /// Streamed tool arguments.
    ToolParams,
    /// Tool result.
    ToolResponse,
    /// Workflow variables changed.
    UpdateVariables,
    /// Error reported by the workflow.
    Error,
    /// Anything else, kept verbatim.
    Other(String),
}

impl EventType {
    /// Classifies an event name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "answer" => EventType::Answer,
            "fastAnswer" => EventType::FastAnswer,
            "flowNodeStatus" => EventType::FlowNodeStatus,
            "moduleStatus" => EventType::ModuleStatus,
            "moduleStart" => EventType::ModuleStart,
            "moduleEnd" => EventType::ModuleEnd,
            "flowResponses" => EventType::FlowResponses,
            "thinking" => EventType::Thinking,
            "thinkingStart" => EventType::ThinkingStart,
            "thinkingEnd" => EventType::ThinkingEnd,
            "toolCall" => EventType::ToolCall,
            "toolParams" => EventType::ToolParams,
            "toolResponse" => EventType::ToolResponse,
            "updateVariables" => EventType::UpdateVariables,
            "error" => EventType::Error,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Answer => "answer",
            EventType::FastAnswer => "fastAnswer",
            EventType::FlowNodeStatus => "flowNodeStatus",
            EventType::ModuleStatus => "moduleStatus",
            EventType::ModuleStart => "moduleStart",
            EventType::ModuleEnd => "moduleEnd",
            EventType::FlowResponses => "flowResponses",
            EventType::Thinking => "thinking",
            EventType::ThinkingStart => "thinkingStart",
            EventType::ThinkingEnd => "thinkingEnd",
            EventType::ToolCall => "toolCall",
            EventType::ToolParams => "toolParams",
            EventType::ToolResponse => "toolResponse",
            EventType::UpdateVariables => "updateVariables",
            EventType::Error => "error",
            EventType::Other(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Still in progress.
    Running,
    /// Completed.
    Success,
    /// Failed.
    Error,
}

impl StepStatus {
    /// Reads `status` from a payload, defaulting to `Running`.
    pub fn from_payload(payload: &Value) -> Self {
        match payload.get("status").and_then(Value::as_str) {
            Some("success" | "finished" | "done") => StepStatus::Success,
            Some("error" | "failed") => StepStatus::Error,
            _ => StepStatus::Running,
        }
    }
}

/// A workflow progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    /// Unique step id.
    pub id: String,
    /// Event type that produced the step.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Node or tool name.
    pub name: String,
    /// Step status.
    pub status: StepStatus,
    /// Human-readable content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Full payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// When the step was observed.
    pub timestamp: DateTime<Utc>,
}

impl ProcessingStep {
    /// Builds a step from a frame payload.
    ///
    /// The name comes from `name`, then `moduleName`, then the event type.
    pub fn from_payload(event_type: &str, payload: &Value, status: StepStatus) -> Self {
        let name = payload
            .get("name")
            .or_else(|| payload.get("moduleName"))
            .and_then(Value::as_str)
            .unwrap_or(event_type)
            .to_string();

        Self {
            id: format!("{event_type}-{}", uuid::Uuid::new_v4().simple()),
            step_type: event_type.to_string(),
            name,
            status,
            content: Some(payload_text(payload)),
            details: Some(payload.clone()),
            timestamp: Utc::now(),
        }
    }
}

/// Human-readable text of a payload.
///
/// A string payload is returned as is, an object yields its `content` or
/// `text` member, and anything else is rendered as JSON.
pub fn payload_text(payload: &Value) -> String {
    if let Value::String(s) = payload {
        return s.clone();
    }

    match payload.get("content").or_else(|| payload.get("text")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => payload.to_string(),
    }
}
