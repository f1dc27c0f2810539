//! HTTP surface tests with both external services mocked.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use memory_chatbot::AppState;
use memory_chatbot::config::AppConfig;
use memory_chatbot::credentials::Credentials;
use memory_chatbot::memory::context::EMPTY_CONTEXT;
use memory_chatbot::server::router;
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============= Helper Functions =============

struct Harness {
    server: TestServer,
    memory: MockServer,
    completion: MockServer,
}

async fn harness(default_credentials: Credentials) -> Harness {
    let memory = MockServer::start().await;
    let completion = MockServer::start().await;

    let mut config = AppConfig::default();
    config.memory.base_url = memory.uri();
    config.completion.base_url = completion.uri();

    let state = AppState::new(Arc::new(config), default_credentials).unwrap();
    let server = TestServer::new(router(state)).expect("Failed to create test server");

    Harness {
        server,
        memory,
        completion,
    }
}

fn valid_keys() -> Credentials {
    Credentials::new("gsk_test", "m0-test")
}

async fn create_session(server: &TestServer, body: serde_json::Value) -> serde_json::Value {
    let response = server.post("/api/sessions").json(&body).await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

fn completion_reply(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

// ============= Session Tests =============

#[tokio::test]
async fn test_health() {
    let h = harness(Credentials::default()).await;
    let response = h.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_create_session_reports_warnings() {
    let h = harness(Credentials::default()).await;

    let body = create_session(
        &h.server,
        json!({"completion_key": "sk-openai", "memory_key": "m0-test"}),
    )
    .await;

    assert_eq!(body["configured"], false);
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(
        warnings[0]["text"],
        "Enter a valid Groq API key (starts with gsk_)"
    );
    assert_eq!(warnings[0]["level"], "warning");
    assert!(
        warnings
            .iter()
            .any(|w| w["text"] == "Please configure both API keys in the sidebar to start chatting.")
    );
}

#[tokio::test]
async fn test_session_defaults_to_server_keys() {
    let h = harness(valid_keys()).await;
    let body = create_session(&h.server, json!({})).await;
    assert_eq!(body["configured"], true);
    assert!(body["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_session() {
    let h = harness(Credentials::default()).await;
    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap();

    h.server
        .delete(&format!("/api/sessions/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    h.server
        .delete(&format!("/api/sessions/{id}"))
        .await
        .assert_status_not_found();
    h.server
        .get(&format!("/api/sessions/{id}/messages"))
        .await
        .assert_status_not_found();
}

// ============= Chat Tests =============

#[tokio::test]
async fn test_unconfigured_chat_makes_no_calls() {
    let h = harness(Credentials::default()).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&h.memory)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_reply("hi")))
        .expect(0)
        .mount(&h.completion)
        .await;

    let body = create_session(
        &h.server,
        json!({"completion_key": "gsk_test", "memory_key": "mem0-wrong"}),
    )
    .await;
    let id = body["session_id"].as_str().unwrap();

    let response = h
        .server
        .post("/api/chat")
        .json(&json!({"session_id": id, "message": "Hello"}))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let err: serde_json::Value = response.json();
    assert_eq!(
        err["warnings"][0]["text"],
        "Enter a valid Mem0 API key (starts with m0-)"
    );

    let messages: serde_json::Value = h.server.get(&format!("/api/sessions/{id}/messages")).await.json();
    assert_eq!(messages, json!([]));
}

#[tokio::test]
async fn test_chat_unknown_session_and_empty_message() {
    let h = harness(valid_keys()).await;

    h.server
        .post("/api/chat")
        .json(&json!({"session_id": "nope", "message": "Hello"}))
        .await
        .assert_status_not_found();

    let body = create_session(&h.server, json!({})).await;
    h.server
        .post("/api/chat")
        .json(&json!({"session_id": body["session_id"], "message": "   "}))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_chat_turn_uses_memories_and_stores_exchange() {
    let h = harness(valid_keys()).await;

    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .and(header("authorization", "Token m0-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1", "memory": "Name is Ada"}
        ])))
        .expect(1)
        .mount(&h.memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/"))
        .and(body_partial_json(json!({
            "user_id": "default_user",
            "messages": [
                {"role": "user", "content": "What is my name?"},
                {"role": "assistant", "content": "Your name is Ada."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "2", "memory": "Asked for their name"}]
        })))
        .expect(1)
        .mount(&h.memory)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer gsk_test"))
        .and(body_string_contains("1. Name is Ada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_reply("Your name is Ada.")))
        .expect(1)
        .mount(&h.completion)
        .await;

    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap();

    let response = h
        .server
        .post("/api/chat")
        .json(&json!({"session_id": id, "message": "What is my name?"}))
        .await;

    response.assert_status_ok();
    let chat: serde_json::Value = response.json();
    assert_eq!(chat["reply"], "Your name is Ada.");
    assert_eq!(chat["memory_count"], 1);
    assert_eq!(chat["notices"][0]["text"], "Memory saved: 1 items stored");

    let messages: serde_json::Value = h.server.get(&format!("/api/sessions/{id}/messages")).await.json();
    assert_eq!(
        messages,
        json!([
            {"role": "user", "content": "What is my name?"},
            {"role": "assistant", "content": "Your name is Ada."}
        ])
    );
}

#[tokio::test]
async fn test_failed_completion_is_still_remembered() {
    let h = harness(valid_keys()).await;

    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("memory down"))
        .mount(&h.memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/memories/"))
        .and(body_string_contains("Error getting response: "))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Error retrieving memories."))
        .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
        .expect(1)
        .mount(&h.completion)
        .await;

    let body = create_session(&h.server, json!({})).await;
    let response = h
        .server
        .post("/api/chat")
        .json(&json!({"session_id": body["session_id"], "message": "Hello"}))
        .await;

    response.assert_status_ok();
    let chat: serde_json::Value = response.json();
    assert!(chat["reply"].as_str().unwrap().starts_with("Error getting response: "));
    assert_eq!(chat["memory_count"], 0);
    let notices = chat["notices"].as_array().unwrap();
    assert!(
        notices[0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error retrieving from Mem0: ")
    );
    assert_eq!(notices[1]["text"], "Memory saved: 0 items stored");
}

// ============= Memory Tests =============

#[tokio::test]
async fn test_search_and_clear_memories() {
    let h = harness(valid_keys()).await;

    Mock::given(method("POST"))
        .and(path("/v1/memories/search/"))
        .and(body_partial_json(json!({"query": "tea"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": "7", "memory": "Likes green tea"}]
        })))
        .expect(1)
        .mount(&h.memory)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
        .expect(1)
        .mount(&h.memory)
        .await;

    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap().to_string();

    let response = h
        .server
        .get("/api/memories")
        .add_query_param("session_id", &id)
        .add_query_param("q", "tea")
        .await;
    response.assert_status_ok();
    let found: serde_json::Value = response.json();
    assert_eq!(found["memories"][0]["memory"], "Likes green tea");

    let response = h
        .server
        .delete("/api/memories")
        .add_query_param("session_id", &id)
        .await;
    response.assert_status_ok();
    let cleared: serde_json::Value = response.json();
    assert_eq!(cleared["notices"][0]["text"], "All memories cleared!");
}

#[tokio::test]
async fn test_context_endpoint() {
    let h = harness(valid_keys()).await;

    Mock::given(method("GET"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.memory)
        .await;

    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap();

    let response = h.server.get(&format!("/api/sessions/{id}/context")).await;
    response.assert_status_ok();
    let ctx: serde_json::Value = response.json();
    assert_eq!(ctx["context"], EMPTY_CONTEXT);
    assert_eq!(ctx["memory_count"], 0);
}

// ============= Page Tests =============

fn location(response: &axum_test::TestResponse) -> String {
    response
        .header("location")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_index_starts_session_and_renders() {
    let h = harness(Credentials::default()).await;

    let response = h.server.get("/").await;
    response.assert_status(StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with("/?session="));

    let session_id = target.trim_start_matches("/?session=");
    let page = h.server.get("/").add_query_param("session", session_id).await;
    page.assert_status_ok();
    let html = page.text();
    assert!(html.contains("AI Memory Chatbot with Mem0"));
    assert!(html.contains("Please configure both API keys in the sidebar to start chatting."));
    assert!(!html.contains("action=\"/chat\""));
}

#[tokio::test]
async fn test_unknown_session_gets_a_new_one() {
    let h = harness(Credentials::default()).await;
    let response = h.server.get("/").add_query_param("session", "stale").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert!(!location(&response).contains("stale"));
}

#[tokio::test]
async fn test_credentials_form_configures_session() {
    let h = harness(Credentials::default()).await;
    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap();

    let response = h
        .server
        .post("/credentials")
        .form(&[
            ("session_id", id),
            ("completion_key", "gsk_form"),
            ("memory_key", "m0-form"),
        ])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/?session={id}"));

    let html = h.server.get("/").add_query_param("session", id).await.text();
    assert!(html.contains("API keys configured."));
    assert!(html.contains("action=\"/chat\""));

    // Notices are shown once.
    let html = h.server.get("/").add_query_param("session", id).await.text();
    assert!(!html.contains("API keys configured."));
}

#[tokio::test]
async fn test_clear_memories_form() {
    let h = harness(valid_keys()).await;

    Mock::given(method("DELETE"))
        .and(path("/v1/memories/"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&h.memory)
        .await;

    let body = create_session(&h.server, json!({})).await;
    let id = body["session_id"].as_str().unwrap();

    let response = h
        .server
        .post("/memories/clear")
        .form(&[("session_id", id)])
        .await;
    response.assert_status(StatusCode::SEE_OTHER);

    let html = h.server.get("/").add_query_param("session", id).await.text();
    assert!(html.contains("Error clearing memories: "));
}
