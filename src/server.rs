use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::assistant::{AssistantApi, AssistantsClient, ContentPart, ThreadMessage};
use crate::chat::{RunPhase, bind_assistant};
use crate::config::{AppConfig, AssistantSettings};
use crate::error::ChatError;
use crate::events::build_sse_response;
use crate::session::Session;
use crate::ui;

/// How often expired sessions and finished turns are swept.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Finished turns stay subscribable this long.
const TURN_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Start the Axum server with the provided configuration.
///
/// Resolves the assistant before binding the listener so an unknown assistant
/// id aborts startup. Each session binds it again when it starts.
pub async fn start_server(config: Arc<AppConfig>, settings: AssistantSettings) -> anyhow::Result<()> {
    let client = AssistantsClient::new(&settings, &config.remote)?;
    info!(
        name: "remote.config.loaded",
        base_url = %client.base_url(),
        assistant_id = %settings.assistant_id,
        "Remote assistant service configured"
    );

    let profile = bind_assistant(
        &client,
        &settings.assistant_id,
        config.assistant.model_override.as_deref(),
    )
    .await?;

    let api: Arc<dyn AssistantApi> = Arc::new(client);
    let state = AppState::new(Arc::clone(&config), api, &profile.id);

    spawn_janitor(state.clone(), JANITOR_INTERVAL);

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
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
    let timeout_duration = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/turns/{turn_id}/stream", get(api_turn_stream))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route("/api/sessions/{id}/messages", get(api_get_messages))
        .layer(DefaultBodyLimit::max(64 * 1024))
        // Bounds the time to response headers; an SSE body keeps streaming.
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically forget idle sessions and finished turns.
pub fn spawn_janitor(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    let session_ttl = state.config.server.session_ttl();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let sessions = state.sessions.cleanup_expired_with_timeout(session_ttl);
            let turns = state.turns.prune_finished(TURN_RETENTION).await;
            if sessions > 0 || turns > 0 {
                tracing::debug!(
                    name: "janitor.swept",
                    sessions_removed = sessions,
                    turns_removed = turns,
                    "Expired state removed"
                );
            }
        }
    })
}

fn error_response(e: &ChatError) -> (StatusCode, String) {
    let status = match e {
        ChatError::TurnInProgress(_) => StatusCode::CONFLICT,
        ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ if e.is_remote() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(ui::chat_page(&state.config.ui))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User message content.
    message: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    session_id: Option<String>,
}

/// Response from chat API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Session ID for this conversation.
    pub session_id: String,
    pub turn_id: String,
    /// URL for the SSE stream.
    pub stream_url: String,
}

/// POST /api/chat - Start a turn and get its stream URL.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }

    let session = state
        .activate_session(req.session_id.as_deref().filter(|id| !id.is_empty()))
        .await
        .map_err(|e| error_response(&e))?;

    tracing::info!(
        session_id = %session.id(),
        message_len = message.len(),
        "Received chat request"
    );

    let handle = state
        .turns
        .submit(&session, message)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(ChatResponse {
        stream_url: handle.stream_url(),
        session_id: handle.session_id,
        turn_id: handle.turn_id,
    }))
}

/// GET /api/chat/turns/:turn_id/stream - SSE events of one turn.
async fn api_turn_stream(
    State(state): State<AppState>,
    Path(turn_id): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let stream = state
        .turns
        .subscribe(&turn_id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown turn: {turn_id}")))?;

    Ok(build_sse_response(stream).into_response())
}

/// Session summary for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub thread_id: Option<String>,
    pub message_count: usize,
    pub run_phase: RunPhase,
    pub model_id: String,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            thread_id: session.thread_id(),
            message_count: session.message_count(),
            run_phase: session.run_phase(),
            model_id: session.model_id(),
        }
    }
}

fn find_session(state: &AppState, id: &str) -> Result<Session, (StatusCode, String)> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| error_response(&ChatError::SessionNotFound(id.to_string())))
}

/// GET /api/sessions/:id - Get session details.
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, (StatusCode, String)> {
    let session = find_session(&state, &id)?;
    Ok(Json(SessionInfo::from(&session)))
}

/// DELETE /api/sessions/:id - Forget a local session.
async fn api_delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// Message DTO for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: String,
    pub role: String,
    /// Text parts joined by blank lines.
    pub text: String,
    /// Ids of attached image files.
    pub image_file_ids: Vec<String>,
    pub created_at: i64,
}

impl From<&ThreadMessage> for MessageDto {
    fn from(m: &ThreadMessage) -> Self {
        let mut texts = Vec::new();
        let mut image_file_ids = Vec::new();
        for part in &m.content {
            match part {
                ContentPart::Text { value } => texts.push(value.as_str()),
                ContentPart::ImageFile { file_id } => image_file_ids.push(file_id.clone()),
                ContentPart::Other { .. } => {}
            }
        }
        Self {
            id: m.id.clone(),
            role: m.role.as_str().to_string(),
            text: texts.join("\n\n"),
            image_file_ids,
            created_at: m.created_at,
        }
    }
}

/// GET /api/sessions/:id/messages - Stored messages, oldest first.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, (StatusCode, String)> {
    let session = find_session(&state, &id)?;
    let messages = session
        .chronological_messages()
        .iter()
        .map(MessageDto::from)
        .collect();
    Ok(Json(messages))
}
