//! Frame routing.
//!
//! Every decoded frame is classified by its event type and turned into calls
//! on a [`StreamCallbacks`] sink. Payloads are parsed as JSON first; a payload
//! that is not JSON is treated as plain answer text.

use serde_json::Value;
use std::sync::Arc;

use crate::callbacks::StreamCallbacks;
use crate::errors::FastGptError;
use crate::observability::{preview, MetricsCollector};
use crate::transport::{Frame, DONE_SENTINEL};
use crate::types::chat::completion_delta;
use crate::types::events::{payload_text, EventType, ProcessingStep, StepStatus};

const UNKNOWN_ERROR: &str = "unknown error";
const UNKNOWN_MODULE_TYPE: &str = "unknown";

/// Routes frames to callbacks.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl EventDispatcher {
    /// Creates a dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher that counts frames and error frames.
    pub fn with_metrics(metrics: Arc<dyn MetricsCollector>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    /// Dispatches one frame. Never fails.
    pub fn dispatch(&self, frame: &Frame, sink: &dyn StreamCallbacks) {
        tracing::debug!(
            event = %frame.event_type,
            payload = %preview(&frame.payload),
            "Dispatching frame"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_frame(&frame.event_type);
        }

        let payload = if frame.payload.trim().is_empty() {
            Ok(Value::Object(serde_json::Map::new()))
        } else {
            serde_json::from_str::<Value>(&frame.payload)
        };

        match payload {
            Ok(value) => self.route(&frame.event_type, &value, sink),
            Err(e) => {
                tracing::debug!(
                    event = %frame.event_type,
                    error = %e,
                    "Payload is not JSON, forwarding as text"
                );
                if !frame.payload.is_empty() && frame.payload != DONE_SENTINEL {
                    sink.on_chunk(&frame.payload);
                }
            }
        }
    }

    fn route(&self, event_name: &str, payload: &Value, sink: &dyn StreamCallbacks) {
        match EventType::from_name(event_name) {
            EventType::Answer | EventType::FastAnswer => {
                if let Some(text) = completion_delta(payload).filter(|t| !t.is_empty()) {
                    sink.on_chunk(text);
                }
            }

            EventType::FlowNodeStatus
            | EventType::ModuleStatus
            | EventType::ModuleStart
            | EventType::ModuleEnd => {
                let status = StepStatus::from_payload(payload);
                emit_step(sink, event_name, payload, status);
                sink.on_intermediate_value(payload, event_name);
            }

            EventType::FlowResponses => match payload {
                Value::Array(responses) => {
                    for response in responses {
                        let status = StepStatus::from_payload(response);
                        emit_step(sink, event_name, response, status);

                        let module_type = response
                            .get("moduleType")
                            .and_then(Value::as_str)
                            .unwrap_or(UNKNOWN_MODULE_TYPE);
                        sink.on_intermediate_value(response, &format!("{event_name}-{module_type}"));
                    }
                }
                other => sink.on_intermediate_value(other, event_name),
            },

            EventType::Thinking | EventType::ThinkingStart | EventType::ThinkingEnd => {
                sink.on_intermediate_value(&Value::String(payload_text(payload)), event_name);
                emit_step(sink, event_name, payload, StepStatus::Running);
            }

            EventType::ToolCall | EventType::ToolParams | EventType::ToolResponse => {
                emit_step(sink, event_name, payload, StepStatus::Running);
                sink.on_intermediate_value(payload, event_name);
            }

            EventType::UpdateVariables => {
                emit_step(sink, event_name, payload, StepStatus::Success);
                sink.on_intermediate_value(payload, event_name);
            }

            EventType::Error => {
                let message = error_message(payload);
                tracing::error!(error = %preview(&message), "Workflow reported an error");

                if let Some(metrics) = &self.metrics {
                    metrics.record_upstream_error();
                }

                sink.on_error(&FastGptError::upstream(message));
                emit_step(sink, event_name, payload, StepStatus::Error);
            }

            EventType::Other(_) => match completion_delta(payload) {
                Some(text) => {
                    if !text.is_empty() {
                        sink.on_chunk(text);
                    }
                }
                None => sink.on_intermediate_value(payload, event_name),
            },
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

fn emit_step(sink: &dyn StreamCallbacks, event_name: &str, payload: &Value, status: StepStatus) {
    let step = ProcessingStep::from_payload(event_name, payload, status);
    tracing::debug!(
        step = %step.name,
        status = ?step.status,
        event = %event_name,
        "Processing step"
    );
    sink.on_processing_step(&step);
}

/// `error` as a string, then `error.message`, then `message`.
fn error_message(payload: &Value) -> String {
    let error = payload.get("error");

    error
        .and_then(Value::as_str)
        .or_else(|| error.and_then(|e| e.get("message")).and_then(Value::as_str))
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_ERROR)
        .to_string()
}
