//! HTTP collaborator tests against a local mock server

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use secrecy::SecretString;
use tokio::net::TcpListener;
use voice_chat::voice::{GoogleTts, OpenAiTts, SpeechSynthesizer};
use voice_chat::{CompletionClient, Error, Message, OpenAiCompletion};

/// Requests seen by the mock server
#[derive(Default)]
struct Recorded {
    bodies: Vec<serde_json::Value>,
    auth: Vec<String>,
    queries: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<Recorded>>;

fn auth_header(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn chat_completions(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let auth = auth_header(&headers);
    recorded.lock().unwrap().auth.push(auth.clone());
    let last = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();
    recorded.lock().unwrap().bodies.push(body);

    match last.as_str() {
        _ if auth == "Bearer bad-key" => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": { "message": "Incorrect API key provided" } })),
        ),
        "no choices" => (StatusCode::OK, Json(serde_json::json!({ "choices": [] }))),
        _ => (
            StatusCode::OK,
            Json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": format!("echo: {last}") } }]
            })),
        ),
    }
}

async fn audio_speech(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let mut recorded = recorded.lock().unwrap();
    recorded.auth.push(auth_header(&headers));
    recorded.bodies.push(body);
    b"ID3-openai".to_vec()
}

async fn translate_tts(
    State(recorded): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let idx = query.get("idx").cloned().unwrap_or_default();
    let unsupported = query.get("tl").is_some_and(|tl| tl == "xx");
    recorded.lock().unwrap().queries.push(query);
    if unsupported {
        return (StatusCode::SERVICE_UNAVAILABLE, Vec::new());
    }
    (StatusCode::OK, format!("[{idx}]").into_bytes())
}

/// Start the mock server and return its base URL
async fn spawn_mock() -> (String, Shared) {
    let recorded = Shared::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/audio/speech", post(audio_speech))
        .route("/translate_tts", get(translate_tts))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), recorded)
}

#[tokio::test]
async fn test_completion_request_shape() {
    let (base, recorded) = spawn_mock().await;
    let client = OpenAiCompletion::with_base_url(format!("{base}/v1/"), "gpt-3.5-turbo");

    let messages = [
        Message::system("be brief"),
        Message::user("hello"),
    ];
    let reply = client.complete(&messages, "sk-test").await.unwrap();
    assert_eq!(reply, "echo: hello");

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.auth[0], "Bearer sk-test");
    assert_eq!(
        recorded.bodies[0],
        serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hello" },
            ],
        })
    );
}

#[tokio::test]
async fn test_completion_error_status() {
    let (base, _) = spawn_mock().await;
    let client = OpenAiCompletion::with_base_url(format!("{base}/v1"), "gpt-3.5-turbo");

    let err = client
        .complete(&[Message::user("hello")], "bad-key")
        .await
        .unwrap_err();
    match err {
        Error::Completion(msg) => {
            assert!(msg.contains("401"), "unexpected message: {msg}");
            assert!(msg.contains("Incorrect API key"));
        }
        other => panic!("expected completion error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_completion_without_choices() {
    let (base, _) = spawn_mock().await;
    let client = OpenAiCompletion::with_base_url(format!("{base}/v1"), "gpt-3.5-turbo");

    let err = client
        .complete(&[Message::user("no choices")], "sk-test")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Completion(_)));
}

#[tokio::test]
async fn test_google_tts_chunks_and_concatenates() {
    let (base, recorded) = spawn_mock().await;
    let tts = GoogleTts::with_endpoint(format!("{base}/translate_tts"));

    let sentence = "這是一個很長的句子，".repeat(15);
    let audio = tts.synthesize(&sentence, "zh-TW").await.unwrap();

    let recorded = recorded.lock().unwrap();
    let total = recorded.queries.len();
    assert!(total >= 2);

    let expected: String = (0..total).map(|i| format!("[{i}]")).collect();
    assert_eq!(audio, expected.into_bytes());

    for (idx, query) in recorded.queries.iter().enumerate() {
        assert_eq!(query["tl"], "zh-TW");
        assert_eq!(query["client"], "tw-ob");
        assert_eq!(query["idx"], idx.to_string());
        assert_eq!(query["total"], total.to_string());
        assert!(query["q"].chars().count() <= 100);
    }

    let rejoined: String = recorded.queries.iter().map(|q| q["q"].as_str()).collect();
    assert_eq!(rejoined, sentence);
}

#[tokio::test]
async fn test_google_tts_rejects_blank_text() {
    let (base, recorded) = spawn_mock().await;
    let tts = GoogleTts::with_endpoint(format!("{base}/translate_tts"));

    let err = tts.synthesize("   ", "zh-TW").await.unwrap_err();
    assert!(matches!(err, Error::Tts(_)));
    assert!(recorded.lock().unwrap().queries.is_empty());
}

#[tokio::test]
async fn test_google_tts_error_status() {
    let (base, _) = spawn_mock().await;
    let tts = GoogleTts::with_endpoint(format!("{base}/translate_tts"));

    let err = tts.synthesize("hello", "xx").await.unwrap_err();
    match err {
        Error::Tts(msg) => assert!(msg.contains("503"), "unexpected message: {msg}"),
        other => panic!("expected TTS error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_tts_request() {
    let (base, recorded) = spawn_mock().await;
    let tts = OpenAiTts::new(SecretString::from("sk-tts".to_string()), "nova".to_string(), 1.5)
        .unwrap()
        .with_base_url(format!("{base}/v1"));

    let audio = tts.synthesize("hello", "en").await.unwrap();
    assert_eq!(audio, b"ID3-openai");

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.auth[0], "Bearer sk-tts");
    assert_eq!(
        recorded.bodies[0],
        serde_json::json!({ "model": "tts-1", "input": "hello", "voice": "nova", "speed": 1.5 })
    );
}

#[test]
fn test_openai_tts_requires_key() {
    let result = OpenAiTts::new(SecretString::from(String::new()), "alloy".to_string(), 1.0);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_typed_key_beats_configured_key_for_openai_tts() {
    let (base, recorded) = spawn_mock().await;
    let mut config = voice_chat::Config::default();
    config.voice.provider = voice_chat::config::TtsProvider::OpenAi;
    config.llm.base_url = format!("{base}/v1");
    config.llm.api_key = Some(SecretString::from("sk-configured".to_string()));

    let typed = voice_chat::session::synthesizer_from_config(
        &config,
        Some(SecretString::from("sk-typed".to_string())),
    )
    .unwrap();
    typed.synthesize("hello", "en").await.unwrap();

    let configured = voice_chat::session::synthesizer_from_config(&config, None).unwrap();
    configured.synthesize("hello", "en").await.unwrap();

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.auth, ["Bearer sk-typed", "Bearer sk-configured"]);
}
