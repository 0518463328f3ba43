//! HTTP API server for voice chat sessions

pub mod health;
pub mod sessions;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::session::ChatSession;
use crate::{Error, Result};

/// Builds a fresh session for each `POST /api/sessions`
pub type SessionFactory = Arc<dyn Fn() -> Result<ChatSession> + Send + Sync>;

/// A session shared between request handlers
pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Sessions untouched for this long are dropped
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct SessionEntry {
    session: SharedSession,
    last_used: Instant,
}

/// Shared state for API handlers
pub struct ApiState {
    factory: SessionFactory,
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    idle_timeout: Duration,
}

impl ApiState {
    #[must_use]
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }

    /// State whose sessions are built from `config`
    #[must_use]
    pub fn from_config(config: Arc<Config>) -> Self {
        Self::new(Arc::new(move || ChatSession::from_config(&config, None)))
    }

    /// Drop sessions left unused for `timeout`
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Create a session and return its id
    ///
    /// # Errors
    ///
    /// Returns error if the session factory fails
    pub async fn create_session(&self) -> Result<Uuid> {
        let session = (self.factory)()?;
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                last_used: Instant::now(),
            },
        );
        tracing::info!(session_id = %id, "session created");
        Ok(id)
    }

    /// Look up a session by id, marking it as used
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such session exists
    pub async fn session(&self, id: Uuid) -> Result<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        entry.last_used = Instant::now();
        Ok(Arc::clone(&entry.session))
    }

    /// Drop a session, cancelling its playback
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such session exists
    pub async fn remove_session(&self, id: Uuid) -> Result<()> {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.session.lock().await.stop_playback();
                tracing::info!(session_id = %id, "session removed");
                Ok(())
            }
            None => Err(Error::NotFound(format!("session {id}"))),
        }
    }

    /// Drop every session idle for at least the idle timeout
    ///
    /// Returns the number of sessions dropped. A session still serving a
    /// request stays alive until that request finishes.
    pub async fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < self.idle_timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, remaining = sessions.len(), "dropped idle sessions");
        }
        pruned
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Build the full API router
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .merge(sessions::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound or the server fails
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %addr, "API server listening");

        let sweeper = spawn_idle_sweeper(Arc::clone(&self.state));

        let served = axum::serve(listener, router(self.state))
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")));

        sweeper.abort();
        served
    }

    /// Spawn the API server as a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Periodically drop idle sessions
fn spawn_idle_sweeper(state: Arc<ApiState>) -> tokio::task::JoinHandle<()> {
    let period = (state.idle_timeout() / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.prune_idle().await;
        }
    })
}
