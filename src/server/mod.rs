//! HTTP Server
//!
//! REST surface for repository management, file access and prompt dispatch.

pub mod auth;
mod claude;
pub mod error;
mod extract;
mod files;
mod git;
pub mod routes;

use crate::cli::ServeArgs;
use crate::config::Config;
use crate::dispatch::PromptDispatcher;
use crate::engine::{ClaudeCliEngine, ConversationEngine};
use crate::git::{GitCli, Vcs};
use crate::repo::PathResolver;
use crate::repo::locks::RepoLocks;
use crate::session::SessionStore;
use anyhow::{Context, Result};
use auth::AuthState;
use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: PathResolver,
    pub sessions: SessionStore,
    pub dispatcher: PromptDispatcher,
    pub auth: AuthState,
}

impl AppState {
    /// Wire every component from `config` and the two external collaborators.
    pub fn new(
        config: Config,
        vcs: Arc<dyn Vcs>,
        engine: Arc<dyn ConversationEngine>,
    ) -> Self {
        let sessions = SessionStore::new();
        let resolver = PathResolver::new(&config.repos_root, vcs, RepoLocks::new());
        let dispatcher = PromptDispatcher::new(engine, sessions.clone(), &config.engine);
        let auth = AuthState::new(config.auth.api_key.clone());
        Self {
            config: Arc::new(config),
            resolver,
            sessions,
            dispatcher,
            auth,
        }
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let auth = state.auth.clone();

    Router::new()
        // Public
        .route("/health", get(health))
        .route("/api/docs", get(docs))
        // Repository management
        .route("/git/init", post(git::init))
        .route("/git/repos", get(git::list_repos))
        .route("/git/status/{repo}", get(git::status))
        .route("/git/save", post(git::save))
        .route("/git/pull", post(git::pull))
        .route("/git/branch", post(git::branch))
        .route("/git/checkout", post(git::checkout))
        .route("/git/log/{repo}", get(git::log))
        .route("/git/reset", post(git::reset))
        .route("/git/diff/{repo}", get(git::diff))
        .route("/git/repo/{repo}", axum::routing::delete(git::delete_repo))
        // File access
        .route("/git/repos/{name}/files", get(files::tree))
        .route(
            "/git/repos/{name}/files/{*path}",
            get(files::read).put(files::write),
        )
        // Sessions and prompts
        .route(
            "/claude/sessions",
            get(claude::list_sessions).post(claude::create_session),
        )
        .route(
            "/claude/sessions/{id}",
            get(claude::get_session).delete(claude::delete_session),
        )
        .route("/claude/prompt", post(claude::prompt))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(auth::require_auth))
        .layer(axum::Extension(auth))
        // CORS + tracing
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request()),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load().await?;
    if let Some(root) = args.repos_root {
        config.repos_root = root;
    }

    let vcs: Arc<dyn Vcs> = Arc::new(GitCli::from_config(&config.git));
    let engine: Arc<dyn ConversationEngine> = Arc::new(ClaudeCliEngine::from_config(&config.engine));
    let state = AppState::new(config, vcs, engine);

    if state.auth.is_enabled() {
        tracing::info!("API key configured, authentication required");
    } else {
        tracing::warn!("No API key configured, authentication is disabled");
    }

    let repos_root = state.resolver.repos_root().to_path_buf();
    tokio::fs::create_dir_all(&repos_root)
        .await
        .with_context(|| format!("Failed to create repos root {}", repos_root.display()))?;

    let shutdown = state.dispatcher.cancellation_token();
    let app = router(state);

    let addr = format!("{}:{}", args.hostname, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(repos_root = %repos_root.display(), "Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down, cancelling in-flight prompts");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Health check response
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

async fn docs() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": routes::ROUTES,
    }))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
