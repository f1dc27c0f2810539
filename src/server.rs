use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::chat::TurnError;
use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::llm::Message;
use crate::memory::MemoryRecord;
use crate::notice::Notice;
use crate::session::Session;
use crate::ui::ChatPage;

/// How often idle sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    default_credentials: Credentials,
) -> anyhow::Result<()> {
    info!(
        name: "services.config.loaded",
        memory_base_url = %config.memory.base_url,
        completion_base_url = %config.completion.base_url,
        model = %config.completion.model,
        user_id = %config.memory.user_id,
        prefilled_keys = !default_credentials.is_empty(),
        "Service configuration loaded"
    );

    let state = AppState::new(Arc::clone(&config), default_credentials)?;
    spawn_session_sweeper(&state);

    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/credentials", post(form_credentials))
        .route("/chat", post(form_chat))
        .route("/memories/clear", post(form_clear_memories))
        .route("/api/sessions", post(api_create_session))
        .route("/api/sessions/{id}", delete(api_delete_session))
        .route("/api/sessions/{id}/messages", get(api_get_messages))
        .route("/api/sessions/{id}/context", get(api_get_context))
        .route("/api/chat", post(api_chat))
        .route(
            "/api/memories",
            get(api_search_memories).delete(api_clear_memories),
        )
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Discard sessions idle longer than the configured timeout.
fn spawn_session_sweeper(state: &AppState) {
    let sessions = state.sessions.clone();
    let timeout = Duration::from_secs(state.config.server.session_timeout_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(timeout);
            if removed > 0 {
                info!(
                    name: "session.expired",
                    removed,
                    remaining = sessions.len(),
                    "Expired idle sessions"
                );
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IndexQuery {
    #[serde(default)]
    session: Option<String>,
}

fn session_url(session: &Session) -> String {
    format!("/?session={}", session.id())
}

/// GET / - Render the chat page, starting a session when needed.
async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> Response {
    let Some(session) = query.session.as_deref().and_then(|id| state.sessions.get(id)) else {
        let session = state.start_session(state.default_credentials.clone());
        return Redirect::to(&session_url(&session)).into_response();
    };

    match state.templates.render_chat(&ChatPage::from_session(&session)) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(session_id = %session.id(), error = %e, "Failed to render chat page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// Form body for the sidebar key inputs.
#[derive(Debug, Deserialize)]
struct CredentialsForm {
    session_id: String,
    #[serde(default)]
    completion_key: String,
    #[serde(default)]
    memory_key: String,
}

/// POST /credentials - Replace the session keys.
///
/// A blank input keeps the key already stored.
async fn form_credentials(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Redirect {
    let Some(session) = state.sessions.get(&form.session_id) else {
        return Redirect::to("/");
    };

    let current = session.credentials();
    let keep = |new: String, old: String| if new.trim().is_empty() { old } else { new };
    let credentials = Credentials::new(
        keep(form.completion_key, current.completion_key),
        keep(form.memory_key, current.memory_key),
    );

    let notices = state.chat.configure(&session, credentials);
    // Validation warnings are rendered from the credentials on every page.
    session.push_notices(notices.into_iter().filter(|n| !n.is_warning()));
    Redirect::to(&session_url(&session))
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    session_id: String,
    #[serde(default)]
    message: String,
}

/// POST /chat - Run one turn from the chat input.
async fn form_chat(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Redirect {
    let Some(session) = state.sessions.get(&form.session_id) else {
        return Redirect::to("/");
    };

    match state.chat.handle_turn(&session, &form.message).await {
        Ok(outcome) => session.push_notices(outcome.notices),
        Err(TurnError::EmptyMessage) => {}
        Err(TurnError::NotConfigured { .. }) => {
            tracing::debug!(session_id = %session.id(), "Chat input while not configured");
        }
    }
    Redirect::to(&session_url(&session))
}

#[derive(Debug, Deserialize)]
struct SessionForm {
    session_id: String,
}

/// POST /memories/clear - "Clear All Memories" button.
async fn form_clear_memories(
    State(state): State<AppState>,
    Form(form): Form<SessionForm>,
) -> Redirect {
    let Some(session) = state.sessions.get(&form.session_id) else {
        return Redirect::to("/");
    };

    if let Ok(notice) = state.chat.clear_memories(&session).await {
        session.push_notices([notice]);
    }
    Redirect::to(&session_url(&session))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Error body returned by the JSON API.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<Notice>,
}

#[derive(Debug)]
enum ApiError {
    SessionNotFound,
    NotConfigured(Vec<Notice>),
    EmptyMessage,
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::NotConfigured { warnings } => Self::NotConfigured(warnings),
            TurnError::EmptyMessage => Self::EmptyMessage,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, warnings) = match self {
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "session not found", Vec::new()),
            Self::NotConfigured(warnings) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "chat is not configured",
                warnings,
            ),
            Self::EmptyMessage => (StatusCode::BAD_REQUEST, "message is empty", Vec::new()),
        };
        let body = ErrorBody {
            error: error.to_string(),
            warnings,
        };
        (status, Json(body)).into_response()
    }
}

fn find_session(state: &AppState, id: &str) -> Result<Session, ApiError> {
    state.sessions.get(id).ok_or(ApiError::SessionNotFound)
}

/// Request body for session creation.
#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    completion_key: Option<String>,
    #[serde(default)]
    memory_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
    configured: bool,
    warnings: Vec<Notice>,
}

/// POST /api/sessions - Start a session, optionally with keys.
///
/// Keys left out fall back to the ones the server was started with.
async fn api_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let defaults = &state.default_credentials;
    let credentials = Credentials::new(
        req.completion_key
            .unwrap_or_else(|| defaults.completion_key.clone()),
        req.memory_key.unwrap_or_else(|| defaults.memory_key.clone()),
    );

    let session = state.start_session(credentials);
    // Drain so the page does not show them again.
    session.take_notices();

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().to_string(),
            configured: session.backends().is_some(),
            warnings: session.credentials().validate().warnings,
        }),
    )
}

/// DELETE /api/sessions/:id - End a session.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => {
            info!(name: "session.ended", session_id = %id, "Session ended");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /api/sessions/:id/messages - Get session messages.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let session = find_session(&state, &id)?;
    Ok(Json(session.transcript()))
}

#[derive(Debug, Serialize)]
struct ContextResponse {
    context: String,
    memory_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

/// GET /api/sessions/:id/context - The context block the next turn would use.
async fn api_get_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContextResponse>, ApiError> {
    let session = find_session(&state, &id)?;
    let context = state.chat.memory_context(&session).await?;
    Ok(Json(ContextResponse {
        context: context.text,
        memory_count: context.record_count,
        notice: context.notice,
    }))
}

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: String,
    /// User message content.
    message: String,
}

/// Response from chat API.
#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
    memory_count: usize,
    notices: Vec<Notice>,
}

/// POST /api/chat - Run one turn.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    tracing::info!(
        session_id = %req.session_id,
        message_length = req.message.len(),
        "Received chat request"
    );

    let session = find_session(&state, &req.session_id)?;
    let outcome = state.chat.handle_turn(&session, &req.message).await?;

    Ok(Json(ChatResponse {
        session_id: req.session_id,
        reply: outcome.reply,
        memory_count: outcome.memory_count,
        notices: outcome.notices,
    }))
}

#[derive(Debug, Deserialize)]
struct MemoriesQuery {
    session_id: String,
    #[serde(default)]
    q: Option<String>,
}

#[derive(Debug, Serialize)]
struct MemoriesResponse {
    memories: Vec<MemoryRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<Notice>,
}

/// GET /api/memories - Search memories, or list all without `q`.
async fn api_search_memories(
    State(state): State<AppState>,
    Query(query): Query<MemoriesQuery>,
) -> Result<Json<MemoriesResponse>, ApiError> {
    let session = find_session(&state, &query.session_id)?;
    let recall = state.chat.recall(&session, query.q.as_deref()).await?;
    Ok(Json(MemoriesResponse {
        memories: recall.records,
        notice: recall.notice,
    }))
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct NoticesResponse {
    notices: Vec<Notice>,
}

/// DELETE /api/memories - Delete every memory of the session's user.
async fn api_clear_memories(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<NoticesResponse>, ApiError> {
    let session = find_session(&state, &query.session_id)?;
    let notice = state.chat.clear_memories(&session).await?;
    Ok(Json(NoticesResponse {
        notices: vec![notice],
    }))
}
