//! `/git/repos/{name}/files` handlers

use super::AppState;
use super::extract::ApiJson;
use crate::error::{RelayError, RelayResult};
use crate::repo::files::{self, FileNode};
use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryListing {
    repo_name: String,
    path: String,
    #[serde(rename = "type")]
    node_type: &'static str,
    children: Vec<FileNode>,
}

pub(super) async fn tree(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> RelayResult<Response> {
    let root = state.resolver.resolve_existing(&name).await?;
    let children = files::list_tree(&root, &root).await?;
    Ok(Json(DirectoryListing {
        repo_name: name,
        path: String::new(),
        node_type: "directory",
        children,
    })
    .into_response())
}

pub(super) async fn read(
    State(state): State<AppState>,
    Path((name, file_path)): Path<(String, String)>,
) -> RelayResult<Response> {
    let root = state.resolver.resolve_existing(&name).await?;
    let target = files::resolve_file(&root, &file_path).await?;

    let meta = match tokio::fs::metadata(&target).await {
        Ok(meta) => meta,
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
            ) =>
        {
            return Err(RelayError::NotFound(format!("File not found: {}", file_path)));
        }
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        let children = files::list_tree(&root, &target).await?;
        return Ok(Json(DirectoryListing {
            repo_name: name,
            path: file_path.trim_matches('/').to_string(),
            node_type: "directory",
            children,
        })
        .into_response());
    }

    let content = files::read_file(&root, &file_path).await?;
    Ok(Json(content).into_response())
}

#[derive(Deserialize)]
pub(super) struct WriteRequest {
    content: Option<String>,
}

pub(super) async fn write(
    State(state): State<AppState>,
    Path((name, file_path)): Path<(String, String)>,
    ApiJson(req): ApiJson<WriteRequest>,
) -> RelayResult<Response> {
    let content = req
        .content
        .ok_or_else(|| RelayError::InvalidRequest("content is required".to_string()))?;
    let root = state.resolver.resolve_existing(&name).await?;

    let _guard = state.resolver.locks().lock(&root).await;
    let outcome = files::write_file(&root, &file_path, &content).await?;
    tracing::info!(repo = %name, path = %outcome.path, created = outcome.created, "File written");

    let message = if outcome.created {
        "File created"
    } else {
        "File updated"
    };
    Ok(Json(json!({
        "message": message,
        "path": outcome.path,
        "size": outcome.size,
        "modified": outcome.modified,
        "created": outcome.created,
    }))
    .into_response())
}
