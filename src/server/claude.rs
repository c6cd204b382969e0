//! `/claude/*` handlers: sessions and prompt dispatch

use super::AppState;
use super::extract::ApiJson;
use crate::dispatch::{DispatchRequest, DispatchResult};
use crate::error::{RelayError, RelayResult};
use crate::session::Session;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Directory for a request: the resolved repository, or the process cwd.
async fn working_directory(state: &AppState, repo: Option<&str>) -> RelayResult<PathBuf> {
    match repo.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reference) => state.resolver.resolve_existing(reference).await,
        None => Ok(std::env::current_dir()?),
    }
}

#[derive(Deserialize)]
pub(super) struct CreateSessionRequest {
    repo: Option<String>,
}

pub(super) async fn create_session(
    State(state): State<AppState>,
    body: Option<ApiJson<CreateSessionRequest>>,
) -> RelayResult<Json<Session>> {
    let repo = body.and_then(|ApiJson(req)| req.repo);
    let directory = working_directory(&state, repo.as_deref()).await?;
    let session = state.sessions.create(directory, repo);
    tracing::info!(session_id = %session.id, "Session created");
    Ok(Json(session))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionList {
    sessions: Vec<Session>,
    total_count: usize,
}

pub(super) async fn list_sessions(State(state): State<AppState>) -> Json<SessionList> {
    let sessions = state.sessions.list_all();
    Json(SessionList {
        total_count: sessions.len(),
        sessions,
    })
}

pub(super) async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RelayResult<Json<Session>> {
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or_else(|| RelayError::NotFound(format!("Session not found: {}", id)))
}

pub(super) async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> RelayResult<Json<Value>> {
    if !state.sessions.delete(&id) {
        return Err(RelayError::NotFound(format!("Session not found: {}", id)));
    }
    tracing::info!(session_id = %id, "Session deleted");
    Ok(Json(json!({ "message": "Session deleted", "sessionId": id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PromptRequest {
    prompt: Option<String>,
    repo: Option<String>,
    session_id: Option<String>,
    #[serde(default, rename = "continue")]
    continue_conversation: bool,
    max_turns: Option<u32>,
}

pub(super) async fn prompt(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PromptRequest>,
) -> RelayResult<Json<DispatchResult>> {
    let prompt = req.prompt.unwrap_or_default();
    if prompt.trim().is_empty() {
        return Err(RelayError::InvalidRequest("Prompt is required".to_string()));
    }
    // A live session fixes the directory, so `repo` is only resolved without one
    let live_session = req.session_id.as_deref().and_then(|id| state.sessions.get(id));
    let directory = match live_session {
        Some(session) => session.working_directory().to_path_buf(),
        None => working_directory(&state, req.repo.as_deref()).await?,
    };

    // Dropped with the request, so a disconnected client stops the engine
    let cancel = CancellationToken::new();
    let _request_guard = cancel.clone().drop_guard();

    let result = state
        .dispatcher
        .dispatch(
            DispatchRequest {
                prompt,
                working_directory: directory,
                turn_budget: req.max_turns,
                continue_conversation: req.continue_conversation,
                session_id: req.session_id,
            },
            cancel,
        )
        .await?;
    Ok(Json(result))
}
