//! `/git/*` handlers

use super::AppState;
use super::extract::{ApiJson, ApiQuery};
use crate::error::{RelayError, RelayResult};
use crate::git::{self, CommitInfo, Remote, ResetMode, validate_ref_arg};
use crate::repo::{ClonedRepository, index};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;

const DEFAULT_LOG_LIMIT: usize = 10;
const MAX_LOG_LIMIT: usize = 100;

fn required<'a>(value: &'a Option<String>, field: &str) -> RelayResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest(format!("{} is required", field)))
}

fn checked_ref<'a>(value: &'a str, field: &str) -> RelayResult<&'a str> {
    validate_ref_arg(value)
        .map_err(|reason| RelayError::InvalidRequest(format!("Invalid {}: {}", field, reason)))?;
    Ok(value)
}

fn repo_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[derive(Deserialize)]
pub(super) struct InitRequest {
    url: Option<String>,
}

pub(super) async fn init(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<InitRequest>,
) -> RelayResult<Json<ClonedRepository>> {
    let url = required(&req.url, "url")?;
    let cloned = state.resolver.init(url).await?;
    Ok(Json(cloned))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RepoListResponse {
    repositories: Vec<index::RepositorySummary>,
    total_count: usize,
    valid_git_repos: usize,
}

pub(super) async fn list_repos(State(state): State<AppState>) -> RelayResult<Json<RepoListResponse>> {
    let repositories =
        index::list(state.resolver.repos_root(), state.resolver.vcs().as_ref()).await?;
    let valid_git_repos = repositories.iter().filter(|r| r.is_git_repo).count();
    Ok(Json(RepoListResponse {
        total_count: repositories.len(),
        valid_git_repos,
        repositories,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatusResponse {
    repo_name: String,
    current_branch: Option<String>,
    tracking_branch: Option<String>,
    ahead: u32,
    behind: u32,
    staged: Vec<String>,
    modified: Vec<String>,
    untracked: Vec<String>,
    deleted: Vec<String>,
    is_clean: bool,
    branches: Vec<String>,
    remotes: Vec<Remote>,
}

pub(super) async fn status(
    State(state): State<AppState>,
    Path(repo): Path<String>,
) -> RelayResult<Json<StatusResponse>> {
    let path = state.resolver.resolve_existing(&repo).await?;
    let vcs = state.resolver.vcs();

    let status = vcs.status(&path).await.map_err(RelayError::VcsFailure)?;
    let (_, branches) = vcs.branches(&path).await.map_err(RelayError::VcsFailure)?;
    let remotes = vcs.remotes(&path).await.map_err(RelayError::VcsFailure)?;

    Ok(Json(StatusResponse {
        repo_name: repo_name_of(&path),
        is_clean: status.is_clean(),
        current_branch: status.current_branch,
        tracking_branch: status.tracking_branch,
        ahead: status.ahead,
        behind: status.behind,
        staged: status.staged,
        modified: status.modified,
        untracked: status.untracked,
        deleted: status.deleted,
        branches,
        remotes,
    }))
}

#[derive(Deserialize)]
pub(super) struct SaveRequest {
    repo: Option<String>,
    message: Option<String>,
}

pub(super) async fn save(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SaveRequest>,
) -> RelayResult<Json<git::SaveOutcome>> {
    let repo = required(&req.repo, "repo")?;
    let message = required(&req.message, "message")?;
    let path = state.resolver.resolve_existing(repo).await?;

    let _guard = state.resolver.locks().lock(&path).await;
    let outcome = git::save(state.resolver.vcs().as_ref(), &path, message)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub(super) struct PullRequest {
    repo: Option<String>,
    remote: Option<String>,
    branch: Option<String>,
}

pub(super) async fn pull(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PullRequest>,
) -> RelayResult<Json<Value>> {
    let repo = required(&req.repo, "repo")?;
    let remote = checked_ref(req.remote.as_deref().unwrap_or("origin"), "remote")?;
    let branch = req
        .branch
        .as_deref()
        .map(|b| checked_ref(b, "branch"))
        .transpose()?;
    let path = state.resolver.resolve_existing(repo).await?;

    let _guard = state.resolver.locks().lock(&path).await;
    let output = state
        .resolver
        .vcs()
        .pull(&path, remote, branch)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(json!({
        "message": format!("Pulled from {}", remote),
        "output": output,
    })))
}

#[derive(Deserialize)]
pub(super) struct BranchRequest {
    repo: Option<String>,
    branch: Option<String>,
}

pub(super) async fn branch(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BranchRequest>,
) -> RelayResult<Json<Value>> {
    let repo = required(&req.repo, "repo")?;
    let path = state.resolver.resolve_existing(repo).await?;
    let vcs = state.resolver.vcs();

    match req.branch.as_deref() {
        Some(branch) => {
            let branch = checked_ref(branch, "branch")?;
            let _guard = state.resolver.locks().lock(&path).await;
            vcs.create_branch(&path, branch)
                .await
                .map_err(RelayError::VcsFailure)?;
            Ok(Json(json!({
                "message": format!("Created and switched to branch {}", branch),
                "branch": branch,
            })))
        }
        None => {
            let (current, branches) = vcs.branches(&path).await.map_err(RelayError::VcsFailure)?;
            Ok(Json(json!({ "current": current, "branches": branches })))
        }
    }
}

#[derive(Deserialize)]
pub(super) struct CheckoutRequest {
    repo: Option<String>,
    branch: Option<String>,
}

pub(super) async fn checkout(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CheckoutRequest>,
) -> RelayResult<Json<Value>> {
    let repo = required(&req.repo, "repo")?;
    let branch = checked_ref(required(&req.branch, "branch")?, "branch")?;
    let path = state.resolver.resolve_existing(repo).await?;

    let _guard = state.resolver.locks().lock(&path).await;
    state
        .resolver
        .vcs()
        .checkout(&path, branch)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(json!({
        "message": format!("Switched to branch {}", branch),
        "branch": branch,
    })))
}

#[derive(Deserialize)]
pub(super) struct LogQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
pub(super) struct LogResponse {
    commits: Vec<CommitInfo>,
}

pub(super) async fn log(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> RelayResult<Json<LogResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);
    let path = state.resolver.resolve_existing(&repo).await?;
    let commits = state
        .resolver
        .vcs()
        .log(&path, limit)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(LogResponse { commits }))
}

#[derive(Deserialize)]
pub(super) struct ResetRequest {
    repo: Option<String>,
    mode: Option<String>,
    target: Option<String>,
}

pub(super) async fn reset(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetRequest>,
) -> RelayResult<Json<Value>> {
    let repo = required(&req.repo, "repo")?;
    let mode = match req.mode.as_deref() {
        Some(raw) => ResetMode::parse(raw).ok_or_else(|| {
            RelayError::InvalidRequest(format!(
                "Invalid reset mode '{}': expected soft, mixed or hard",
                raw
            ))
        })?,
        None => ResetMode::default(),
    };
    let target = checked_ref(req.target.as_deref().unwrap_or("HEAD"), "target")?;
    let path = state.resolver.resolve_existing(repo).await?;

    let _guard = state.resolver.locks().lock(&path).await;
    state
        .resolver
        .vcs()
        .reset(&path, mode, target)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(json!({
        "message": format!("Reset to {}", target),
        "mode": mode,
        "target": target,
    })))
}

#[derive(Deserialize)]
pub(super) struct DiffQuery {
    #[serde(default)]
    staged: bool,
}

pub(super) async fn diff(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    ApiQuery(query): ApiQuery<DiffQuery>,
) -> RelayResult<Json<Value>> {
    let path = state.resolver.resolve_existing(&repo).await?;
    let diff = state
        .resolver
        .vcs()
        .diff(&path, query.staged)
        .await
        .map_err(RelayError::VcsFailure)?;
    Ok(Json(json!({ "diff": diff, "staged": query.staged })))
}

pub(super) async fn delete_repo(
    State(state): State<AppState>,
    Path(repo): Path<String>,
) -> RelayResult<Json<Value>> {
    let path: PathBuf = state.resolver.path_for_name(&repo)?;

    let _guard = state.resolver.locks().lock(&path).await;
    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RelayError::NotFound(format!("Repository not found: {}", repo)));
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(repo = %repo, "Repository deleted");
    Ok(Json(json!({
        "message": format!("Repository {} deleted", repo),
        "repoName": repo,
    })))
}
