//! Chat session endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiState;
use crate::Error;
use crate::conversation::Message;
use crate::session::Turn;

/// Build session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/{id}/chat", post(chat))
        .with_state(state)
}

/// Session creation response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
}

async fn create_session(
    State(state): State<Arc<ApiState>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let id = state.create_session().await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

/// One chat submission
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub system_directive: String,
    #[serde(default)]
    pub api_key: String,
    pub message: String,
}

/// Visible history after a turn
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub history: Vec<Turn>,
}

async fn chat(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = state.session(id).await?;
    let mut session = session.lock().await;

    let history = session
        .submit(&request.system_directive, &request.api_key, &request.message)
        .await?
        .to_vec();

    Ok(Json(ChatResponse { history }))
}

/// Snapshot of a session's conversation window
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub system_directive: String,
    pub messages: Vec<Message>,
    /// `None` when the session's model has no token accounting
    pub token_count: Option<usize>,
}

async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session(id).await?;
    let session = session.lock().await;
    let conversation = session.conversation();

    let token_count = match conversation.token_count() {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::debug!(error = %e, "token count unavailable");
            None
        }
    };

    Ok(Json(SessionResponse {
        system_directive: conversation.system_directive().to_string(),
        messages: conversation.messages().cloned().collect(),
        token_count,
    }))
}

async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.remove_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Session API errors
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let (status, code) = match &self.0 {
            Error::EmptyInput => (StatusCode::BAD_REQUEST, "empty_input"),
            Error::MissingCredential => (StatusCode::BAD_REQUEST, "missing_credential"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Completion(_) | Error::Http(_) => (StatusCode::BAD_GATEWAY, "completion_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let message = self.0.to_string();
        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
