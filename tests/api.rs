//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tower::ServiceExt;
use voice_chat::PlaceholderCompletion;
use voice_chat::api::{self, ApiState};

mod common;
use common::{ScriptedCompletion, text_session};

/// Build a test API router whose sessions use `completion`
fn build_test_router(completion: Arc<ScriptedCompletion>, debug: bool) -> (axum::Router, Arc<ApiState>) {
    let state = Arc::new(ApiState::new(Arc::new(move || -> voice_chat::Result<_> {
        let session = text_session(5, completion.clone());
        Ok(if debug {
            session.with_debug_bypass(PlaceholderCompletion::default())
        } else {
            session
        })
    })));
    (api::router(state.clone()), state)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create_session(app: &axum::Router) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/api/sessions")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_router(Arc::new(ScriptedCompletion::default()), false);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_chat_returns_history() {
    let completion = Arc::new(ScriptedCompletion::default());
    let (app, state) = build_test_router(completion.clone(), false);
    let id = create_session(&app).await;
    assert_eq!(state.session_count().await, 1);

    let body = serde_json::json!({
        "system_directive": "be brief",
        "api_key": "sk-test",
        "message": "hello",
    });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["history"][0]["user"], "hello");
    assert_eq!(json["history"][0]["assistant"], "reply to hello");

    let body = serde_json::json!({
        "system_directive": "be brief",
        "api_key": "sk-test",
        "message": "more",
    });
    let (_, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;
    assert_eq!(json["history"].as_array().unwrap().len(), 2);
    assert_eq!(completion.last_prompt().len(), 4);
}

#[tokio::test]
async fn test_get_session_snapshot() {
    let (app, _) = build_test_router(Arc::new(ScriptedCompletion::default()), false);
    let id = create_session(&app).await;

    let request = Request::builder()
        .uri(format!("/api/sessions/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["system_directive"], "");
    assert_eq!(json["messages"], serde_json::json!([]));
    assert_eq!(json["token_count"], 2);

    let body = serde_json::json!({ "system_directive": "d", "api_key": "k", "message": "hi" });
    send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;

    let request = Request::builder()
        .uri(format!("/api/sessions/{id}"))
        .body(Body::empty())
        .unwrap();
    let (_, json) = send(&app, request).await;
    assert_eq!(json["system_directive"], "d");
    assert_eq!(json["messages"][0], serde_json::json!({ "role": "user", "content": "hi" }));
    assert_eq!(json["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn test_missing_credential_is_bad_request() {
    let completion = Arc::new(ScriptedCompletion::default());
    let (app, _) = build_test_router(completion.clone(), false);
    let id = create_session(&app).await;

    let body = serde_json::json!({ "system_directive": "d", "message": "hello" });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "missing_credential");
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn test_empty_input_is_bad_request() {
    let (app, _) = build_test_router(Arc::new(ScriptedCompletion::default()), false);
    let id = create_session(&app).await;

    let body = serde_json::json!({ "system_directive": "d", "api_key": "k", "message": "  " });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "empty_input");
    assert_eq!(json["error"]["message"], "please enter a message");
}

#[tokio::test]
async fn test_debug_session_needs_no_credential() {
    let (app, _) = build_test_router(Arc::new(ScriptedCompletion::default()), true);
    let id = create_session(&app).await;

    let body = serde_json::json!({ "message": "hello" });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["history"][0]["assistant"], voice_chat::completion::DEBUG_PLACEHOLDER);
}

#[tokio::test]
async fn test_completion_failure_is_bad_gateway() {
    let completion = Arc::new(ScriptedCompletion::default());
    completion.fail_next(true);
    let (app, _) = build_test_router(completion, false);
    let id = create_session(&app).await;

    let body = serde_json::json!({ "system_directive": "d", "api_key": "k", "message": "hello" });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["code"], "completion_failed");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (app, _) = build_test_router(Arc::new(ScriptedCompletion::default()), false);
    let id = uuid::Uuid::new_v4();

    let body = serde_json::json!({ "api_key": "k", "message": "hello" });
    let (status, json) = send(&app, post_json(&format!("/api/sessions/{id}/chat"), &body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_session() {
    let (app, state) = build_test_router(Arc::new(ScriptedCompletion::default()), false);
    let id = create_session(&app).await;

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/sessions/{id}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(state.session_count().await, 0);

    let (status, _) = send(&app, delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_idle_sessions_are_pruned() {
    let completion = Arc::new(ScriptedCompletion::default());
    let state = ApiState::new(Arc::new(move || -> voice_chat::Result<_> {
        Ok(text_session(5, completion.clone()))
    }))
    .with_idle_timeout(std::time::Duration::ZERO);

    let id = state.create_session().await.unwrap();
    assert_eq!(state.prune_idle().await, 1);
    assert_eq!(state.session_count().await, 0);
    assert!(matches!(
        state.session(id).await,
        Err(voice_chat::Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_recent_sessions_survive_pruning() {
    let (app, state) = build_test_router(Arc::new(ScriptedCompletion::default()), false);
    assert_eq!(state.idle_timeout(), api::DEFAULT_SESSION_IDLE_TIMEOUT);
    let id = create_session(&app).await;

    assert_eq!(state.prune_idle().await, 0);
    assert!(state.session(id.parse().unwrap()).await.is_ok());
}
