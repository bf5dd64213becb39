//! Integration tests using WireMock
//!
//! These tests drive the client through the real HTTP transport against a
//! mock FastGPT server: streamed turns, the non-streamed facade, and the
//! session endpoints.

mod facade;
mod session;
mod streaming;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fastgpt_client::{AgentConfig, Callbacks, FastGptClient, RetryConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "fastgpt-integration-key";
pub const APP_ID: &str = "app-integration";

/// Starts a mock server.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// A client for the mock server with fast retries.
pub fn client_for(base_uri: &str, max_retries: u32) -> FastGptClient {
    let config = AgentConfig::builder()
        .base_url(format!("{base_uri}/api"))
        .api_key(API_KEY)
        .app_id(APP_ID)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("valid config");

    FastGptClient::builder()
        .config(config)
        .retry(
            RetryConfig::new()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(5)),
        )
        .build()
        .expect("client builds")
}

/// An authenticated POST to the chat completions endpoint.
pub fn chat_completions() -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("Authorization", format!("Bearer {API_KEY}").as_str()))
}

/// An event-stream response with the given body.
pub fn event_stream(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

/// Everything a streamed turn reported, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Start,
    Chunk(String),
    Step(String),
    Value(String),
    Error(String),
    Finish,
}

/// Callbacks recording into a shared log.
pub fn recorder() -> (Callbacks, Arc<Mutex<Vec<Seen>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));

    let start = Arc::clone(&log);
    let chunk = Arc::clone(&log);
    let step = Arc::clone(&log);
    let value = Arc::clone(&log);
    let error = Arc::clone(&log);
    let finish = Arc::clone(&log);

    let callbacks = Callbacks::new()
        .with_start(move || start.lock().unwrap().push(Seen::Start))
        .with_chunk(move |text| chunk.lock().unwrap().push(Seen::Chunk(text.to_string())))
        .with_processing_step(move |s| step.lock().unwrap().push(Seen::Step(s.name.clone())))
        .with_intermediate_value(move |_, event_type| {
            value.lock().unwrap().push(Seen::Value(event_type.to_string()));
        })
        .with_error(move |e| error.lock().unwrap().push(Seen::Error(e.to_string())))
        .with_finish(move || finish.lock().unwrap().push(Seen::Finish));

    (callbacks, log)
}

/// Concatenated chunk text from a log.
pub fn text_of(log: &Mutex<Vec<Seen>>) -> String {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|s| match s {
            Seen::Chunk(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
