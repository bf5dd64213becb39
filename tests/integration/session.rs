//! Integration tests for session initialization and question suggestions

use super::*;
use fastgpt_client::services::default_suggestions;
use serde_json::json;
use wiremock::matchers::{body_partial_json, query_param};

#[tokio::test]
async fn test_initialize_chat() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/core/chat/init"))
        .and(query_param("appId", APP_ID))
        .and(query_param("chatId", "chat-77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {
                "chatId": "chat-77",
                "appId": APP_ID,
                "app": {
                    "name": "Travel Agent",
                    "chatModels": ["gpt-4o"],
                    "chatConfig": {"questionGuide": true, "welcomeText": "Where to?"}
                }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = client_for(&mock_server.uri(), 0)
        .session()
        .initialize_chat(Some("chat-77"))
        .await;

    assert_eq!(response.data.app.name, "Travel Agent");
    assert_eq!(response.data.app.chat_config.welcome_text, "Where to?");
    assert_eq!(response.data.app.chat_models, vec!["gpt-4o".to_string()]);
}

#[tokio::test]
async fn test_initialize_chat_falls_back_on_not_found() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/core/chat/init"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let response = client_for(&mock_server.uri(), 0)
        .session()
        .initialize_chat(Some("chat-1"))
        .await;

    assert_eq!(response.code, 200);
    assert_eq!(response.data.chat_id, "chat-1");
    assert_eq!(response.data.app_id, APP_ID);
    assert_eq!(response.data.app.name, "AI Assistant");
}

#[tokio::test]
async fn test_question_suggestions() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/api/core/ai/agent/v2/createQuestionGuide"))
        .and(body_partial_json(json!({
            "appId": APP_ID,
            "questionGuide": {"open": true, "model": "GPT-4o-mini"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": ["Best season to visit?", "Cheapest flights?"]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let suggestions = client_for(&mock_server.uri(), 0)
        .session()
        .question_suggestions(None, None)
        .await;

    assert_eq!(suggestions, vec!["Best season to visit?", "Cheapest flights?"]);
}

#[tokio::test]
async fn test_question_suggestions_fall_back() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/api/core/ai/agent/v2/createQuestionGuide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 500, "data": []})))
        .mount(&mock_server)
        .await;

    let suggestions = client_for(&mock_server.uri(), 0)
        .session()
        .question_suggestions(None, None)
        .await;

    assert_eq!(suggestions, default_suggestions());
}
