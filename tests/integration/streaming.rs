//! Integration tests for streamed chat turns

use super::*;
use fastgpt_client::{ChatOptions, ChatTurn, FastGptError, StreamOutcome, DEGRADED_MESSAGE};
use serde_json::json;
use wiremock::matchers::body_partial_json;

const WORKFLOW: &str = "event: flowNodeStatus\n\
data: {\"status\":\"running\",\"name\":\"Knowledge search\"}\n\
\n\
event: answer\n\
data: {\"choices\":[{\"delta\":{\"content\":\"Paris is\"}}]}\n\
\n\
data: {\"choices\":[{\"delta\":{\"content\":\" the capital.\"}}]}\n\
\n\
event: flowResponses\n\
data: [{\"moduleName\":\"AI Chat\",\"moduleType\":\"chatNode\"}]\n\
\n\
event: answer\n\
data: [DONE]\n\
\n";

#[tokio::test]
async fn test_streamed_turn_through_http() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .and(body_partial_json(json!({
            "model": APP_ID,
            "stream": true,
            "detail": true,
            "messages": [{"role": "user", "content": "Capital of France?"}]
        })))
        .respond_with(event_stream(WORKFLOW))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri(), 0);
    let (callbacks, log) = recorder();

    let outcome = client
        .chat()
        .send_chat(
            &[ChatTurn::user("Capital of France?")],
            ChatOptions::new(),
            &callbacks,
        )
        .await
        .unwrap();

    assert!(outcome.is_finished());
    assert_eq!(text_of(&log), "Paris is the capital.");

    let log = log.lock().unwrap().clone();
    assert_eq!(log.first(), Some(&Seen::Start));
    assert_eq!(log.last(), Some(&Seen::Finish));
    assert!(log.contains(&Seen::Step("Knowledge search".to_string())));
    assert!(log.contains(&Seen::Value("flowResponses-chatNode".to_string())));
}

#[tokio::test]
async fn test_retries_then_degrades_on_server_error() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri(), 2);
    let (callbacks, log) = recorder();

    let outcome = client
        .chat()
        .send_chat(&[ChatTurn::user("hi")], ChatOptions::new(), &callbacks)
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        StreamOutcome::Degraded {
            error: FastGptError::Server { status_code: 500, .. }
        }
    ));
    assert_eq!(
        *log.lock().unwrap(),
        vec![Seen::Chunk(DEGRADED_MESSAGE.to_string()), Seen::Finish]
    );
    assert_eq!(client.metrics().retries, 2);
}

#[tokio::test]
async fn test_json_response_to_streamed_turn_degrades() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri(), 0);
    let (callbacks, log) = recorder();

    let outcome = client
        .chat()
        .send_chat(&[ChatTurn::user("hi")], ChatOptions::new(), &callbacks)
        .await
        .unwrap();

    assert!(matches!(
        outcome.degraded_error(),
        Some(FastGptError::ContentType { .. })
    ));
    assert!(!log.lock().unwrap().contains(&Seen::Start));
    assert_eq!(text_of(&log), DEGRADED_MESSAGE);
}

#[tokio::test]
async fn test_slow_server_times_out_and_degrades() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(event_stream("data: {}\n\n").set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri(), 0);
    let (callbacks, _log) = recorder();

    let outcome = client
        .chat()
        .send_chat(
            &[ChatTurn::user("hi")],
            ChatOptions::new().timeout(Duration::from_millis(200)),
            &callbacks,
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome.degraded_error(),
        Some(FastGptError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_server_degrades() {
    let uri = {
        let server = setup_mock_server().await;
        server.uri()
    };

    let client = client_for(&uri, 1);
    let (callbacks, log) = recorder();

    let outcome = client
        .chat()
        .send_chat(&[ChatTurn::user("hi")], ChatOptions::new(), &callbacks)
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert_eq!(text_of(&log), DEGRADED_MESSAGE);
}

#[tokio::test]
async fn test_upstream_error_frame_is_reported() {
    let mock_server = setup_mock_server().await;

    chat_completions()
        .respond_with(event_stream(
            "event: error\ndata: {\"message\":\"quota exceeded\"}\n\n",
        ))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri(), 0);
    let (callbacks, log) = recorder();

    let outcome = client
        .chat()
        .send_chat(&[ChatTurn::user("hi")], ChatOptions::new(), &callbacks)
        .await
        .unwrap();

    assert!(outcome.is_finished());
    assert!(log
        .lock()
        .unwrap()
        .contains(&Seen::Error("quota exceeded".to_string())));
    assert_eq!(client.metrics().upstream_errors, 1);
}
