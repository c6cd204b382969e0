//! Optional bearer-token authentication middleware
//!
//! When an API key is configured, every endpoint except the public ones
//! requires `Authorization: Bearer <key>`. Without a key the gate is open.

use axum::{
    Json,
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;

/// Paths that are exempt from authentication.
const PUBLIC_PATHS: &[&str] = &["/health", "/api/docs"];

/// Shared auth state.
#[derive(Clone)]
pub struct AuthState {
    /// The required Bearer token, if any.
    token: Option<Arc<String>>,
}

impl AuthState {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            token: api_key.filter(|k| !k.is_empty()).map(Arc::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Axum middleware enforcing Bearer auth on every non-public request.
pub async fn require_auth(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.iter().any(|p| path == *p) {
        return next.run(request).await;
    }

    // Set by the router; absent means the router was built without auth.
    let Some(expected) = request
        .extensions()
        .get::<AuthState>()
        .and_then(|state| state.token.clone())
    else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()));

    if authorized {
        next.run(request).await
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        unauthorized()
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }

    #[test]
    fn empty_key_disables_auth() {
        assert!(!AuthState::new(Some(String::new())).is_enabled());
        assert!(!AuthState::new(None).is_enabled());
        assert!(AuthState::new(Some("k".into())).is_enabled());
    }

    #[test]
    fn debug_does_not_leak_token() {
        let state = AuthState::new(Some("secret-key".into()));
        assert!(!format!("{:?}", state).contains("secret-key"));
    }
}
