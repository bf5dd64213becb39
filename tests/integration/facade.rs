//! Integration tests for non-streamed chat turns

use super::*;
use fastgpt_client::services::{PROCESSING_FALLBACK, SERVER_FALLBACK};
use fastgpt_client::{ChatOptions, ChatTurn, FastGptError};
use serde_json::json;
use wiremock::matchers::body_partial_json;

#[tokio::test]
async fn test_chat_returns_completion_text() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .and(body_partial_json(json!({"stream": false, "model": APP_ID})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": APP_ID,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Bonjour!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = client_for(&mock_server.uri(), 3)
        .chat()
        .chat(&[ChatTurn::user("Say hello in French")], ChatOptions::new())
        .await
        .unwrap();

    assert_eq!(answer, "Bonjour!");
}

#[tokio::test]
async fn test_chat_server_error_is_not_retried() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&mock_server)
        .await;

    let answer = client_for(&mock_server.uri(), 3)
        .chat()
        .chat(&[ChatTurn::user("hi")], ChatOptions::new())
        .await
        .unwrap();

    assert_eq!(answer, SERVER_FALLBACK);
}

#[tokio::test]
async fn test_chat_html_body_is_processing_failure() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>login</html>", "text/html"))
        .mount(&mock_server)
        .await;

    let answer = client_for(&mock_server.uri(), 0)
        .chat()
        .chat(&[ChatTurn::user("hi")], ChatOptions::new())
        .await
        .unwrap();

    assert_eq!(answer, PROCESSING_FALLBACK);
}

#[tokio::test]
async fn test_chat_without_app_id_is_configuration_error() {
    let mock_server = setup_mock_server().await;

    let client = FastGptClient::builder()
        .base_url(format!("{}/api", mock_server.uri()))
        .api_key(API_KEY)
        .build()
        .unwrap();

    let result = client
        .chat()
        .chat(&[ChatTurn::user("hi")], ChatOptions::new())
        .await;

    assert!(matches!(result, Err(FastGptError::Configuration { .. })));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}
