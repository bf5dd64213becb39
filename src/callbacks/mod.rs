//! Stream callbacks.
//!
//! A streaming call reports everything through a [`StreamCallbacks`] sink.
//! Callbacks run on the task driving the stream, in frame order; the next
//! chunk is not read until the current frame's callbacks have returned.

use serde_json::Value;

use crate::errors::FastGptError;
use crate::types::events::ProcessingStep;

/// Receiver of streaming events. Every method defaults to a no-op.
pub trait StreamCallbacks: Send + Sync {
    /// The server accepted the request and started an event stream.
    fn on_start(&self) {}

    /// Answer text.
    fn on_chunk(&self, _text: &str) {}

    /// Workflow progress.
    fn on_processing_step(&self, _step: &ProcessingStep) {}

    /// Raw intermediate payload, tagged with its event type.
    fn on_intermediate_value(&self, _value: &Value, _event_type: &str) {}

    /// A configuration problem or an error reported by the workflow.
    fn on_error(&self, _error: &FastGptError) {}

    /// The exchange is over.
    fn on_finish(&self) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl StreamCallbacks for NoopCallbacks {}

/// Closure-based callbacks.
///
/// ```rust
/// use fastgpt_client::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .with_chunk(|text| print!("{text}"))
///     .with_finish(|| println!());
/// ```
#[derive(Default)]
pub struct Callbacks {
    start: Option<Box<dyn Fn() + Send + Sync>>,
    chunk: Option<Box<dyn Fn(&str) + Send + Sync>>,
    step: Option<Box<dyn Fn(&ProcessingStep) + Send + Sync>>,
    intermediate: Option<Box<dyn Fn(&Value, &str) + Send + Sync>>,
    error: Option<Box<dyn Fn(&FastGptError) + Send + Sync>>,
    finish: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Callbacks {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start handler.
    #[must_use]
    pub fn with_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    /// Sets the answer text handler.
    #[must_use]
    pub fn with_chunk(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.chunk = Some(Box::new(f));
        self
    }

    /// Sets the processing step handler.
    #[must_use]
    pub fn with_processing_step(
        mut self,
        f: impl Fn(&ProcessingStep) + Send + Sync + 'static,
    ) -> Self {
        self.step = Some(Box::new(f));
        self
    }

    /// Sets the intermediate value handler.
    #[must_use]
    pub fn with_intermediate_value(
        mut self,
        f: impl Fn(&Value, &str) + Send + Sync + 'static,
    ) -> Self {
        self.intermediate = Some(Box::new(f));
        self
    }

    /// Sets the error handler.
    #[must_use]
    pub fn with_error(mut self, f: impl Fn(&FastGptError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the finish handler.
    #[must_use]
    pub fn with_finish(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.finish = Some(Box::new(f));
        self
    }
}

impl StreamCallbacks for Callbacks {
    fn on_start(&self) {
        if let Some(f) = &self.start {
            f();
        }
    }

    fn on_chunk(&self, text: &str) {
        if let Some(f) = &self.chunk {
            f(text);
        }
    }

    fn on_processing_step(&self, step: &ProcessingStep) {
        if let Some(f) = &self.step {
            f(step);
        }
    }

    fn on_intermediate_value(&self, value: &Value, event_type: &str) {
        if let Some(f) = &self.intermediate {
            f(value, event_type);
        }
    }

    fn on_error(&self, error: &FastGptError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }

    fn on_finish(&self) {
        if let Some(f) = &self.finish {
            f();
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_start", &self.start.is_some())
            .field("on_chunk", &self.chunk.is_some())
            .field("on_processing_step", &self.step.is_some())
            .field("on_intermediate_value", &self.intermediate.is_some())
            .field("on_error", &self.error.is_some())
            .field("on_finish", &self.finish.is_some())
            .finish()
    }
}
