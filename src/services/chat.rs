//! Chat completions service.
//!
//! A streamed turn moves through request building, connecting and streaming,
//! and ends in exactly one [`StreamOutcome`]. Transport failures that survive
//! the retry budget do not surface as errors: the turn degrades into a fixed
//! answer delivered through `on_chunk`, followed by `on_finish`.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ServiceContext;
use crate::callbacks::StreamCallbacks;
use crate::config::{ChatOptions, CHAT_COMPLETIONS_PATH, MAX_HISTORY_MESSAGES};
use crate::errors::{FastGptError, FastGptResult};
use crate::observability::{preview, RequestTimer, StreamEnd};
use crate::transport::{FrameStream, HttpRequest, HttpResponse};
use crate::types::chat::{ChatCompletion, ChatRequest, ChatTurn, Role};

/// Answer delivered when a streamed turn degrades.
pub const DEGRADED_MESSAGE: &str = "Sorry, there was a problem connecting to the server. \
     I'll continue in offline mode. How can I help you?";

/// Non-streamed answer when the request never got a response.
pub const CONNECTION_FALLBACK: &str = DEGRADED_MESSAGE;

/// Non-streamed answer when the server reported a failure.
pub const SERVER_FALLBACK: &str = "Sorry, the server returned an error. \
     I'll continue in offline mode. How can I help you?";

/// Non-streamed answer when the response could not be understood.
pub const PROCESSING_FALLBACK: &str = "Sorry, an error occurred while processing your request. \
     I'll continue in offline mode. How can I help you?";

/// How a streamed turn ended.
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// The response body was read to the end.
    Finished,
    /// The fallback answer was delivered instead of a real one.
    Degraded {
        /// Last transport error.
        error: FastGptError,
    },
    /// The caller canceled; `on_finish` was not called.
    Canceled,
}

impl StreamOutcome {
    /// Returns true for a genuine answer.
    pub fn is_finished(&self) -> bool {
        matches!(self, StreamOutcome::Finished)
    }

    /// Returns true when the fallback answer was delivered.
    pub fn is_degraded(&self) -> bool {
        matches!(self, StreamOutcome::Degraded { .. })
    }

    /// Returns true when the caller canceled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, StreamOutcome::Canceled)
    }

    /// The error behind a degraded turn.
    pub fn degraded_error(&self) -> Option<&FastGptError> {
        match self {
            StreamOutcome::Degraded { error } => Some(error),
            _ => None,
        }
    }

    fn end(&self) -> StreamEnd {
        match self {
            StreamOutcome::Finished => StreamEnd::Finished,
            StreamOutcome::Degraded { .. } => StreamEnd::Degraded,
            StreamOutcome::Canceled => StreamEnd::Canceled,
        }
    }
}

/// Chat completions service.
pub struct ChatService {
    ctx: Arc<ServiceContext>,
}

impl ChatService {
    pub(crate) fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Sends one streamed chat turn.
    ///
    /// Returns `Err` only for an incomplete configuration, after reporting it
    /// through `on_error`. Every other failure ends in
    /// [`StreamOutcome::Degraded`].
    ///
    /// The whole exchange is retried as one unit, so frames dispatched before a
    /// mid-body failure are dispatched again on the next attempt.
    #[instrument(skip_all, fields(turns = messages.len()))]
    pub async fn send_chat(
        &self,
        messages: &[ChatTurn],
        options: ChatOptions,
        callbacks: &dyn StreamCallbacks,
    ) -> FastGptResult<StreamOutcome> {
        let request = match self.build_request(messages, &options, true).await {
            Ok(request) => request,
            Err(err) => {
                tracing::error!(error = %err, "Cannot send chat request");
                callbacks.on_error(&err);
                return Err(err);
            }
        };

        let cancel = options.cancel.clone().unwrap_or_default();
        let timer = RequestTimer::new("send_chat");
        self.ctx.metrics.record_stream_started();

        let result = self
            .ctx
            .retry
            .execute_cancelable(&cancel, || self.stream_once(&request, &cancel, callbacks))
            .await;

        let outcome = match result {
            Ok(()) => {
                callbacks.on_finish();
                StreamOutcome::Finished
            }
            Err(error) if cancel.is_cancelled() || matches!(error, FastGptError::Canceled) => {
                tracing::debug!("Chat stream canceled by caller");
                StreamOutcome::Canceled
            }
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    kind = error.kind(),
                    "Chat stream failed, delivering offline answer"
                );
                callbacks.on_chunk(DEGRADED_MESSAGE);
                callbacks.on_finish();
                StreamOutcome::Degraded { error }
            }
        };

        self.ctx
            .metrics
            .record_stream_end(outcome.end(), timer.elapsed());

        tracing::debug!(
            outcome = ?outcome.end(),
            elapsed_ms = timer.elapsed().as_millis(),
            "Chat stream ended"
        );

        Ok(outcome)
    }

    /// One attempt: connect, check the response, and dispatch every frame.
    async fn stream_once(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
        callbacks: &dyn StreamCallbacks,
    ) -> FastGptResult<()> {
        if cancel.is_cancelled() {
            return Err(FastGptError::Canceled);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FastGptError::Canceled),
            response = self.ctx.transport.send_streaming(request.clone()) => response?,
        };

        if !response.is_success() {
            return Err(FastGptError::server(
                response.status,
                format!("Chat request failed with status {}", response.status),
            ));
        }

        if !response.is_event_stream() {
            return Err(FastGptError::ContentType {
                content_type: response.content_type().unwrap_or("none").to_string(),
            });
        }

        callbacks.on_start();

        let mut frames = FrameStream::new(response.stream);
        loop {
            if cancel.is_cancelled() {
                return Err(FastGptError::Canceled);
            }

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FastGptError::Canceled),
                next = frames.next() => next,
            };

            match next {
                Some(Ok(frame)) => self.ctx.dispatcher.dispatch(&frame, callbacks),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }

    /// Sends one non-streamed chat turn and returns the answer text.
    ///
    /// Returns `Err` only for an incomplete configuration or when the caller
    /// cancels. Transport and server failures map to [`CONNECTION_FALLBACK`],
    /// [`SERVER_FALLBACK`] or [`PROCESSING_FALLBACK`]. No retries.
    #[instrument(skip_all, fields(turns = messages.len()))]
    pub async fn chat(&self, messages: &[ChatTurn], options: ChatOptions) -> FastGptResult<String> {
        let request = self.build_request(messages, &options, false).await?;
        let cancel = options.cancel.clone().unwrap_or_default();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FastGptError::Canceled),
            response = self.ctx.transport.send(request) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed, using offline answer");
                return Ok(CONNECTION_FALLBACK.to_string());
            }
        };

        Ok(completion_text(&response))
    }

    async fn build_request(
        &self,
        messages: &[ChatTurn],
        options: &ChatOptions,
        stream: bool,
    ) -> FastGptResult<HttpRequest> {
        self.ctx.validate()?;

        let config = &self.ctx.config;
        let url = config.endpoint_url(CHAT_COMPLETIONS_PATH)?;
        let chat_id = config.conversation_id.get_or_generate().await;

        let body = ChatRequest {
            model: config.app_id.clone().unwrap_or_default(),
            chat_id,
            stream,
            detail: stream.then_some(true),
            messages: prepare_history(messages, config.system_prompt.as_deref()),
            temperature: config.effective_temperature(options),
            max_tokens: config.effective_max_tokens(options),
            variables: options.variables.clone(),
        };
        let body = serde_json::to_vec(&body)?;

        tracing::debug!(
            url = %url,
            stream,
            body = %preview(&String::from_utf8_lossy(&body)),
            "Built chat request"
        );

        let mut request = HttpRequest::post(url)
            .with_body(body)
            .with_timeout(config.effective_timeout(options));
        request.headers = self.ctx.headers();
        if stream {
            request
                .headers
                .insert("Accept".to_string(), mime::TEXT_EVENT_STREAM.to_string());
        }

        Ok(request)
    }
}

/// Answer text of a non-streamed response, or the matching fallback.
///
/// Accepts a bare completion or a `{success, status, data}` proxy envelope.
/// Prepends the agent prompt when the history has no system turn, then keeps
/// the first turn and the most recent ones up to [`MAX_HISTORY_MESSAGES`].
fn prepare_history(messages: &[ChatTurn], system_prompt: Option<&str>) -> Vec<ChatTurn> {
    let mut history = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        if !messages.iter().any(|turn| turn.role == Role::System) {
            history.push(ChatTurn::system(prompt));
        }
    }
    history.extend_from_slice(messages);

    if history.len() > MAX_HISTORY_MESSAGES {
        let dropped = history.len() - MAX_HISTORY_MESSAGES;
        tracing::debug!(dropped, "Trimming chat history");
        history.drain(1..=dropped);
    }
    history
}

fn completion_text(response: &HttpResponse) -> String {
    if !response.is_success() {
        tracing::warn!(status = response.status, "Chat request rejected, using offline answer");
        return SERVER_FALLBACK.to_string();
    }

    let body: Value = match response.json() {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Chat response is not JSON, using offline answer");
            return PROCESSING_FALLBACK.to_string();
        }
    };

    let completion = if body.get("success").is_some() {
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
        let status = body.get("status").and_then(Value::as_u64);
        if !success || status != Some(200) {
            tracing::warn!(?status, success, "Proxy reported a failure, using offline answer");
            return SERVER_FALLBACK.to_string();
        }
        body.get("data").cloned().unwrap_or(Value::Null)
    } else {
        body
    };

    match serde_json::from_value::<ChatCompletion>(completion) {
        Ok(completion) => completion
            .content()
            .map_or_else(|| PROCESSING_FALLBACK.to_string(), str::to_string),
        Err(e) => {
            tracing::warn!(error = %e, "Unexpected chat response shape, using offline answer");
            PROCESSING_FALLBACK.to_string()
        }
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FastGptClient;
    use crate::config::AgentConfig;
    use crate::mocks::{CallbackEvent, MockResponse, MockTransport, RecordingCallbacks};
    use crate::resilience::RetryConfig;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    const HI: &str = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
    const THERE: &str = r#"{"choices":[{"delta":{"content":" there"}}]}"#;

    fn config() -> AgentConfig {
        AgentConfig::builder()
            .base_url("https://fastgpt.example.com/api")
            .api_key("fastgpt-test-key")
            .app_id("app-1")
            .build()
            .unwrap()
    }

    fn client_with(transport: &Arc<MockTransport>, retry: RetryConfig) -> FastGptClient {
        FastGptClient::builder()
            .config(config())
            .transport(transport.clone())
            .retry(retry.initial_delay(Duration::from_millis(1)))
            .build()
            .unwrap()
    }

    fn client(transport: &Arc<MockTransport>) -> FastGptClient {
        client_with(transport, RetryConfig::new())
    }

    fn connection_refused() -> TransportError {
        TransportError::Connection {
            message: "refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_streamed_turn_finishes() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::frames(&[
            ("flowNodeStatus", r#"{"name":"AI Chat","status":"running"}"#),
            ("answer", HI),
            ("answer", THERE),
            ("answer", "[DONE]"),
        ]));

        let client = client(&transport);
        let sink = RecordingCallbacks::new();
        let outcome = client
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(outcome.is_finished());
        assert_eq!(sink.text(), "Hi there");
        assert_eq!(sink.start_count(), 1);
        assert_eq!(sink.finish_count(), 1);
        assert_eq!(sink.steps().len(), 1);
        assert!(matches!(sink.events().first(), Some(CallbackEvent::Start)));
        assert!(matches!(sink.events().last(), Some(CallbackEvent::Finish)));

        let metrics = client.metrics();
        assert_eq!(metrics.streams_started, 1);
        assert_eq!(metrics.streams_finished, 1);
        assert_eq!(metrics.frames, 3);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::frames(&[("answer", HI)]));

        let client = client(&transport);
        let options = ChatOptions::new()
            .temperature(0.3)
            .timeout(Duration::from_secs(5))
            .variables(json!({"city": "Paris"}));
        client
            .chat()
            .send_chat(&[ChatTurn::user("hello")], options, &RecordingCallbacks::new())
            .await
            .unwrap();

        let request = transport.last_request().unwrap();
        assert_eq!(request.url, "https://fastgpt.example.com/api/v1/chat/completions");
        assert_eq!(request.header("accept"), Some("text/event-stream"));
        assert_eq!(request.header("authorization"), Some("Bearer fastgpt-test-key"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));

        let body = request.json_body().unwrap();
        assert_eq!(body["model"], "app-1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["detail"], true);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["variables"]["city"], "Paris");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert!(body["chatId"].as_str().unwrap().starts_with("local_"));
    }

    #[tokio::test]
    async fn test_always_failing_transport_degrades_after_budget() {
        let transport = Arc::new(MockTransport::always_failing());
        let retries = Arc::new(Mutex::new(Vec::new()));
        let retries_clone = Arc::clone(&retries);

        let client = client_with(
            &transport,
            RetryConfig::new().max_retries(2).on_retry(move |attempt, _| {
                retries_clone.lock().unwrap().push(attempt);
            }),
        );
        let sink = RecordingCallbacks::new();
        let outcome = client
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 3);
        assert!(outcome.is_degraded());
        assert!(matches!(
            outcome.degraded_error(),
            Some(FastGptError::Network { .. })
        ));
        assert_eq!(sink.chunks(), vec![DEGRADED_MESSAGE.to_string()]);
        assert_eq!(sink.finish_count(), 1);
        assert_eq!(sink.start_count(), 0);
        assert!(sink.errors().is_empty());
        assert_eq!(*retries.lock().unwrap(), vec![1, 2]);

        let metrics = client.metrics();
        assert_eq!(metrics.streams_degraded, 1);
        assert_eq!(metrics.retries, 2);
    }

    #[tokio::test]
    async fn test_recovers_on_retry() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_failure(connection_refused());
        transport.queue(MockResponse::frames(&[("answer", HI)]));

        let sink = RecordingCallbacks::new();
        let outcome = client(&transport)
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(outcome.is_finished());
        assert_eq!(transport.request_count(), 2);
        assert_eq!(sink.text(), "Hi");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_replays_frames() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(
            MockResponse::frames(&[("answer", HI)]).then_fail(TransportError::InvalidResponse {
                message: "connection reset".to_string(),
            }),
        );
        transport.queue(MockResponse::frames(&[("answer", HI), ("answer", THERE)]));

        let sink = RecordingCallbacks::new();
        let outcome = client(&transport)
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(outcome.is_finished());
        assert_eq!(sink.chunks(), vec!["Hi", "Hi", " there"]);
        assert_eq!(sink.start_count(), 2);
        assert_eq!(sink.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::json(&json!({"ok": true})));

        let sink = RecordingCallbacks::new();
        let outcome = client_with(&transport, RetryConfig::no_retries())
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(matches!(
            outcome.degraded_error(),
            Some(FastGptError::ContentType { content_type }) if content_type == "application/json"
        ));
        assert_eq!(sink.start_count(), 0);
        assert_eq!(sink.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_server_status_degrades() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::status(500, "oops"));

        let sink = RecordingCallbacks::new();
        let outcome = client_with(&transport, RetryConfig::new().max_retries(1))
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(matches!(
            outcome.degraded_error(),
            Some(FastGptError::Server { status_code: 500, .. })
        ));
        assert_eq!(transport.request_count(), 2);
        assert_eq!(sink.text(), DEGRADED_MESSAGE);
    }

    #[tokio::test]
    async fn test_incomplete_config_reports_error_without_call() {
        let transport = Arc::new(MockTransport::new());
        let client = FastGptClient::builder()
            .base_url("https://fastgpt.example.com/api")
            .transport(transport.clone())
            .build()
            .unwrap();

        let sink = RecordingCallbacks::new();
        let result = client
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await;

        assert!(matches!(result, Err(FastGptError::Configuration { .. })));
        assert_eq!(sink.errors().len(), 1);
        assert_eq!(sink.finish_count(), 0);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(client.metrics().streams_started, 0);
    }

    #[tokio::test]
    async fn test_cancel_after_first_frame_is_silent() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::event_stream([format!(
            "event: answer\ndata: {HI}\n\ndata: {THERE}\n\ndata: {THERE}\n\n"
        )]));

        let token = CancellationToken::new();
        let sink = RecordingCallbacks::cancel_after(token.clone(), 1);
        let client = client(&transport);
        let outcome = client
            .chat()
            .send_chat(
                &[ChatTurn::user("hello")],
                ChatOptions::new().cancel_token(token),
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.is_canceled());
        assert_eq!(sink.chunks(), vec!["Hi"]);
        assert_eq!(sink.finish_count(), 0);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.metrics().streams_canceled, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_connect() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::frames(&[("answer", HI)]));

        let token = CancellationToken::new();
        token.cancel();

        let sink = RecordingCallbacks::new();
        let client = client(&transport);
        let outcome = client
            .chat()
            .send_chat(
                &[ChatTurn::user("hello")],
                ChatOptions::new().cancel_token(token),
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.is_canceled());
        assert!(sink.events().is_empty());
        assert_eq!(transport.request_count(), 0);
        assert_eq!(client.metrics().streams_canceled, 1);
    }

    #[tokio::test]
    async fn test_upstream_error_does_not_abort_read() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::frames(&[
            ("error", r#"{"error":"tool failed"}"#),
            ("answer", HI),
        ]));

        let sink = RecordingCallbacks::new();
        let outcome = client(&transport)
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &sink)
            .await
            .unwrap();

        assert!(outcome.is_finished());
        assert_eq!(sink.errors(), vec!["tool failed"]);
        assert_eq!(sink.text(), "Hi");
        assert_eq!(sink.finish_count(), 1);
    }

    #[tokio::test]
    async fn test_conversation_id_reused_across_turns() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::frames(&[("answer", HI)]));

        let client = client(&transport);
        assert_eq!(client.config().conversation_id.get().await, None);

        for _ in 0..2 {
            client
                .chat()
                .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &RecordingCallbacks::new())
                .await
                .unwrap();
        }

        let ids: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.json_body().unwrap()["chatId"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_eq!(client.config().conversation_id.get().await, Some(ids[0].clone()));
    }

    #[tokio::test]
    async fn test_preset_conversation_id_is_sent() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default(MockResponse::frames(&[("answer", HI)]));

        let config = AgentConfig::builder()
            .base_url("https://fastgpt.example.com/api")
            .api_key("fastgpt-test-key")
            .app_id("app-1")
            .conversation_id("chat-42")
            .build()
            .unwrap();
        let client = FastGptClient::builder()
            .config(config)
            .transport(transport.clone())
            .build()
            .unwrap();

        client
            .chat()
            .send_chat(&[ChatTurn::user("hi")], ChatOptions::new(), &RecordingCallbacks::new())
            .await
            .unwrap();

        assert_eq!(transport.last_request().unwrap().json_body().unwrap()["chatId"], "chat-42");
    }

    #[tokio::test]
    async fn test_cancel_while_body_read_is_pending() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(
            MockResponse::frames(&[("answer", HI)])
                .then_fail(TransportError::InvalidResponse {
                    message: "connection reset".to_string(),
                })
                .chunk_delay(Duration::from_millis(100)),
        );

        let token = CancellationToken::new();
        let canceler = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceler.cancel();
        });

        let sink = RecordingCallbacks::new();
        let client = client_with(&transport, RetryConfig::no_retries());
        let outcome = client
            .chat()
            .send_chat(
                &[ChatTurn::user("hello")],
                ChatOptions::new().cancel_token(token),
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.is_canceled());
        assert_eq!(sink.chunks(), vec!["Hi"]);
        assert_eq!(sink.finish_count(), 0);
        assert_eq!(client.metrics().streams_degraded, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_ends_turn() {
        let transport = Arc::new(MockTransport::new());
        transport.set_default_failure(connection_refused());

        let client = FastGptClient::builder()
            .config(config())
            .transport(transport.clone())
            .retry(
                RetryConfig::new()
                    .max_retries(2)
                    .initial_delay(Duration::from_secs(3)),
            )
            .build()
            .unwrap();

        let token = CancellationToken::new();
        let canceler = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceler.cancel();
        });

        let sink = RecordingCallbacks::new();
        let started = std::time::Instant::now();
        let outcome = client
            .chat()
            .send_chat(
                &[ChatTurn::user("hello")],
                ChatOptions::new().cancel_token(token),
                &sink,
            )
            .await
            .unwrap();

        assert!(outcome.is_canceled());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.request_count(), 1);
        assert!(sink.chunks().is_empty());
        assert_eq!(sink.finish_count(), 0);
    }

    fn client_with_prompt(transport: &Arc<MockTransport>, prompt: &str) -> FastGptClient {
        let config = AgentConfig::builder()
            .base_url("https://fastgpt.example.com/api")
            .api_key("fastgpt-test-key")
            .app_id("app-1")
            .system_prompt(prompt)
            .build()
            .unwrap();

        FastGptClient::builder()
            .config(config)
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    fn sent_messages(transport: &MockTransport) -> Vec<Value> {
        let body = transport.last_request().unwrap().json_body().unwrap();
        body["messages"].as_array().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_system_prompt_is_prepended() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::frames(&[("answer", HI)]));

        let client = client_with_prompt(&transport, "You are a travel agent.");
        client
            .chat()
            .send_chat(&[ChatTurn::user("hello")], ChatOptions::new(), &RecordingCallbacks::new())
            .await
            .unwrap();

        let messages = sent_messages(&transport);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], json!({"role": "system", "content": "You are a travel agent."}));
        assert_eq!(messages[1]["role"], "user");
    }

    #[tokio::test]
    async fn test_existing_system_turn_is_kept() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::json(&json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })));

        let client = client_with_prompt(&transport, "You are a travel agent.");
        client
            .chat()
            .chat(
                &[ChatTurn::system("Answer in French."), ChatTurn::user("hello")],
                ChatOptions::new(),
            )
            .await
            .unwrap();

        let messages = sent_messages(&transport);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "Answer in French.");
    }

    #[tokio::test]
    async fn test_long_history_keeps_first_and_latest_turns() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::frames(&[("answer", HI)]));

        let history: Vec<ChatTurn> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("q{i}"))
                } else {
                    ChatTurn::assistant(format!("a{i}"))
                }
            })
            .collect();

        let client = client_with_prompt(&transport, "Be brief.");
        client
            .chat()
            .send_chat(&history, ChatOptions::new(), &RecordingCallbacks::new())
            .await
            .unwrap();

        let messages = sent_messages(&transport);
        let contents: Vec<&str> = messages
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(messages.len(), MAX_HISTORY_MESSAGES);
        assert_eq!(contents[0], "Be brief.");
        assert_eq!(contents[1], "a9");
        assert_eq!(contents[11], "a19");
    }

    #[test]
    fn test_short_history_is_untouched() {
        let history = vec![ChatTurn::user("hello"), ChatTurn::assistant("hi")];
        assert_eq!(prepare_history(&history, None), history);
    }

    #[tokio::test]
    async fn test_facade_returns_answer() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::json(&json!({
            "id": "c1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}}]
        })));

        let client = client(&transport);
        let answer = client
            .chat()
            .chat(&[ChatTurn::user("hi")], ChatOptions::new())
            .await
            .unwrap();

        assert_eq!(answer, "Hello!");
        let request = transport.last_request().unwrap();
        let body = request.json_body().unwrap();
        assert_eq!(body["stream"], false);
        assert!(body.get("detail").is_none());
        assert_eq!(request.header("accept"), None);
    }

    #[tokio::test]
    async fn test_facade_unwraps_proxy_envelope() {
        let transport = Arc::new(MockTransport::new());
        transport.queue(MockResponse::json(&json!({
            "success": true,
            "status": 200,
            "data": {"choices": [{"message": {"role": "assistant", "content": "Proxied"}}]}
        })));

        let answer = client(&transport)
            .chat()
            .chat(&[ChatTurn::user("hi")], ChatOptions::new())
            .await
            .unwrap();

        assert_eq!(answer, "Proxied");
    }

    #[tokio::test]
    async fn test_facade_fallbacks() {
        let cases = [
            (None, CONNECTION_FALLBACK),
            (Some(MockResponse::status(503, "unavailable")), SERVER_FALLBACK),
            (
                Some(MockResponse::json(&json!({"success": false, "status": 500}))),
                SERVER_FALLBACK,
            ),
            (Some(MockResponse::status(200, "not json")), PROCESSING_FALLBACK),
            (Some(MockResponse::json(&json!({"choices": []}))), PROCESSING_FALLBACK),
        ];

        for (response, expected) in cases {
            let transport = Arc::new(MockTransport::new());
            match response {
                Some(response) => transport.queue(response),
                None => transport.queue_failure(connection_refused()),
            }

            let answer = client(&transport)
                .chat()
                .chat(&[ChatTurn::user("hi")], ChatOptions::new())
                .await
                .unwrap();

            assert_eq!(answer, expected);
            assert_eq!(transport.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_facade_rejects_incomplete_config() {
        let client = FastGptClient::builder()
            .transport(Arc::new(MockTransport::new()))
            .build()
            .unwrap();

        let result = client.chat().chat(&[ChatTurn::user("hi")], ChatOptions::new()).await;
        assert!(matches!(result, Err(FastGptError::Configuration { .. })));
    }
}
