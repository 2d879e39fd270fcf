use super::state::AppState;
use crate::crm::{ClientRecord, ClientSummary, NotesError};
use crate::generation::{GenerationRequest, TaskKind};
use crate::protocol::{parse_json_response, PointList};
use crate::session::SessionStats;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientSearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestPointsRequest {
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestPointsResponse {
    pub points: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteBody {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteResponse {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn notes_error(e: NotesError) -> Response {
    match e {
        NotesError::InvalidKey(_) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        NotesError::Io(_) => {
            error!("Notes store failure: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.active_sessions().await,
    })
}

/// GET /sessions
/// Stats for every live session
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    let mut stats: Vec<SessionStats> = sessions.values().map(|rx| rx.borrow().clone()).collect();
    stats.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Json(stats)
}

/// GET /sessions/:session_id/status
/// Get status of one session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.session_stats(&session_id).await {
        Some(stats) => (StatusCode::OK, Json(stats)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Session {} not found", session_id),
        ),
    }
}

/// GET /api/clients?q=
/// Search clients by name, id or primary contact
pub async fn search_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientSearchQuery>,
) -> Json<Vec<ClientSummary>> {
    Json(state.deps.clients.search(&query.q))
}

/// GET /api/clients/:client_id
/// Full client record
pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Response {
    match state.deps.clients.get(&client_id) {
        Some(record) => Json::<ClientRecord>(record.clone()).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Client {} not found", client_id),
        ),
    }
}

/// POST /api/suggest-discussion-points
/// Pre-call discussion points for a client, generated in one request
pub async fn suggest_discussion_points(
    State(state): State<AppState>,
    Json(req): Json<SuggestPointsRequest>,
) -> Response {
    let client_context = match req.client_id.as_deref() {
        Some(id) => match state.deps.clients.get(id) {
            Some(record) => Some(record.context_prompt()),
            None => return error_response(StatusCode::NOT_FOUND, format!("Client {} not found", id)),
        },
        None => None,
    };

    info!(
        "Suggesting discussion points (client={})",
        req.client_id.as_deref().unwrap_or("none")
    );

    let request = GenerationRequest::new(
        TaskKind::DiscussionSuggestions,
        json!({
            "transcript": "",
            "client_context": client_context,
        }),
    );
    let limit = state.deps.settings.timeouts().for_kind(TaskKind::DiscussionSuggestions);
    let generator = &state.deps.generator;

    let collected = tokio::time::timeout(limit, async {
        let mut stream = generator.generate(request).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok::<_, crate::generation::GenerationError>(text)
    })
    .await;

    let response = match collected {
        Ok(Ok(text)) => match parse_json_response::<PointList>(&text) {
            Some(list) => SuggestPointsResponse {
                points: list
                    .points
                    .into_iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
                error: None,
            },
            None => SuggestPointsResponse {
                points: Vec::new(),
                error: Some("Unparseable response from generator".to_string()),
            },
        },
        Ok(Err(e)) => {
            warn!("Discussion point suggestion failed: {}", e);
            SuggestPointsResponse {
                points: Vec::new(),
                error: Some(e.to_string()),
            }
        }
        Err(_) => SuggestPointsResponse {
            points: Vec::new(),
            error: Some("timeout".to_string()),
        },
    };

    Json(response).into_response()
}

/// GET /api/notes/:key
pub async fn get_note(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.deps.notes.get(&key).await {
        Ok(Some(text)) => Json(NoteResponse { key, text }).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Note {} not found", key)),
        Err(e) => notes_error(e),
    }
}

/// PUT /api/notes/:key
pub async fn put_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<NoteBody>,
) -> Response {
    match state.deps.notes.put(&key, &body.text).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => notes_error(e),
    }
}
