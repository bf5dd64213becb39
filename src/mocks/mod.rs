//! Mock implementations for testing.
//!
//! [`MockTransport`] plays back scripted responses, including streamed bodies
//! split into explicit chunks and failures at connect time or mid-body.
//! [`RecordingCallbacks`] records every callback in order.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::callbacks::StreamCallbacks;
use crate::errors::FastGptError;
use crate::transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, StreamingResponse, TransportError,
};
use crate::types::events::ProcessingStep;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Option<Vec<u8>>,
    /// Timeout the caller asked for.
    pub timeout: Option<Duration>,
}

impl RecordedRequest {
    /// Parses the body as JSON.
    pub fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        crate::transport::header_value(&self.headers, name)
    }
}

/// A scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Body chunks, delivered in order. An `Err` ends the body with a read error.
    pub chunks: Vec<Result<Vec<u8>, TransportError>>,
    /// Pause before each chunk.
    pub chunk_delay: Option<Duration>,
}

impl MockResponse {
    fn with_content_type(status: u16, content_type: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());

        Self {
            status,
            headers,
            chunks: Vec::new(),
            chunk_delay: None,
        }
    }

    /// Creates an event stream delivered as the given chunks.
    pub fn event_stream<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        let mut response = Self::with_content_type(200, "text/event-stream; charset=utf-8");
        response.chunks = chunks.into_iter().map(|c| Ok(c.into())).collect();
        response
    }

    /// Creates an event stream with one chunk per `(event, payload)` frame.
    pub fn frames(frames: &[(&str, &str)]) -> Self {
        Self::event_stream(
            frames
                .iter()
                .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n")),
        )
    }

    /// Creates a successful JSON response.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        let mut response = Self::with_content_type(200, "application/json");
        response.chunks = vec![Ok(serde_json::to_vec(value).unwrap_or_default())];
        response
    }

    /// Creates a response with an arbitrary status and text body.
    pub fn status(status: u16, body: &str) -> Self {
        let mut response = Self::with_content_type(status, "text/plain");
        response.chunks = vec![Ok(body.as_bytes().to_vec())];
        response
    }

    /// Replaces the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self
    }

    /// Ends the body with a read error after the scripted chunks.
    #[must_use]
    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.chunks.push(Err(error));
        self
    }

    /// Pauses before every chunk.
    #[must_use]
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }
}

/// Mock HTTP transport for testing.
///
/// Queued outcomes are consumed in order; once the queue is empty the default
/// outcome repeats. Without a default, calls fail with a connection error.
#[derive(Default)]
pub struct MockTransport {
    queue: Mutex<VecDeque<Result<MockResponse, TransportError>>>,
    default: Mutex<Option<Result<MockResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    attempts: AtomicUsize,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport whose every call fails to connect.
    pub fn always_failing() -> Self {
        let transport = Self::new();
        transport.set_default_failure(TransportError::Connection {
            message: "connection refused".to_string(),
        });
        transport
    }

    /// Queues a response.
    pub fn queue(&self, response: MockResponse) {
        lock(&self.queue).push_back(Ok(response));
    }

    /// Queues a connect-time failure.
    pub fn queue_failure(&self, error: TransportError) {
        lock(&self.queue).push_back(Err(error));
    }

    /// Sets the response used once the queue is empty.
    pub fn set_default(&self, response: MockResponse) {
        *lock(&self.default) = Some(Ok(response));
    }

    /// Sets the failure used once the queue is empty.
    pub fn set_default_failure(&self, error: TransportError) {
        *lock(&self.default) = Some(Err(error));
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Gets the last recorded request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.requests).last().cloned()
    }

    /// Returns the number of calls made, successful or not.
    pub fn request_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, request: HttpRequest) -> Result<MockResponse, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            timeout: request.timeout,
        });

        if let Some(outcome) = lock(&self.queue).pop_front() {
            return outcome;
        }

        lock(&self.default).clone().unwrap_or_else(|| {
            Err(TransportError::Connection {
                message: "no mock response configured".to_string(),
            })
        })
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.next_outcome(request)?;

        let mut body = Vec::new();
        for chunk in response.chunks {
            body.extend(chunk?);
        }

        Ok(HttpResponse {
            status: response.status,
            headers: response.headers,
            body,
        })
    }

    async fn send_streaming(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = self.next_outcome(request)?;
        let delay = response.chunk_delay;
        let chunks = response.chunks;

        let stream = async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield chunk.map(Bytes::from);
            }
        };

        Ok(StreamingResponse {
            status: response.status,
            headers: response.headers,
            stream: Box::pin(stream),
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("request_count", &self.request_count())
            .finish_non_exhaustive()
    }
}

/// One recorded callback.
#[derive(Debug, Clone)]
pub enum CallbackEvent {
    /// `on_start`.
    Start,
    /// `on_chunk`.
    Chunk(String),
    /// `on_processing_step`.
    ProcessingStep(ProcessingStep),
    /// `on_intermediate_value`.
    IntermediateValue(Value, String),
    /// `on_error`.
    Error(FastGptError),
    /// `on_finish`.
    Finish,
}

impl CallbackEvent {
    fn is_frame_level(&self) -> bool {
        !matches!(self, CallbackEvent::Start | CallbackEvent::Finish)
    }
}

/// Callbacks that record everything they receive.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
    cancel: Option<(CancellationToken, usize)>,
}

impl RecordingCallbacks {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels `token` once `count` chunk, step, value or error callbacks
    /// have been recorded.
    pub fn cancel_after(token: CancellationToken, count: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel: Some((token, count)),
        }
    }

    fn record(&self, event: CallbackEvent) {
        let mut events = lock(&self.events);
        events.push(event);

        if let Some((token, count)) = &self.cancel {
            let frame_level = events.iter().filter(|e| e.is_frame_level()).count();
            if frame_level >= *count {
                token.cancel();
            }
        }
    }

    /// All callbacks in order.
    pub fn events(&self) -> Vec<CallbackEvent> {
        lock(&self.events).clone()
    }

    /// Text passed to `on_chunk`, in order.
    pub fn chunks(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallbackEvent::Chunk(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Concatenated answer text.
    pub fn text(&self) -> String {
        self.chunks().concat()
    }

    /// Steps passed to `on_processing_step`, in order.
    pub fn steps(&self) -> Vec<ProcessingStep> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallbackEvent::ProcessingStep(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Event type tags passed to `on_intermediate_value`, in order.
    pub fn intermediate_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallbackEvent::IntermediateValue(_, event_type) => Some(event_type),
                _ => None,
            })
            .collect()
    }

    /// Messages of errors passed to `on_error`, in order.
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallbackEvent::Error(err) => Some(err.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Number of `on_start` calls.
    pub fn start_count(&self) -> usize {
        self.count(|e| matches!(e, CallbackEvent::Start))
    }

    /// Number of `on_finish` calls.
    pub fn finish_count(&self) -> usize {
        self.count(|e| matches!(e, CallbackEvent::Finish))
    }

    fn count(&self, predicate: impl Fn(&CallbackEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| predicate(e)).count()
    }
}

impl StreamCallbacks for RecordingCallbacks {
    fn on_start(&self) {
        self.record(CallbackEvent::Start);
    }

    fn on_chunk(&self, text: &str) {
        self.record(CallbackEvent::Chunk(text.to_string()));
    }

    fn on_processing_step(&self, step: &ProcessingStep) {
        self.record(CallbackEvent::ProcessingStep(step.clone()));
    }

    fn on_intermediate_value(&self, value: &Value, event_type: &str) {
        self.record(CallbackEvent::IntermediateValue(
            value.clone(),
            event_type.to_string(),
        ));
    }

    fn on_error(&self, error: &FastGptError) {
        self.record(CallbackEvent::Error(error.clone()));
    }

    fn on_finish(&self) {
        self.record(CallbackEvent::Finish);
    }
}
