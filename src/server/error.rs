//! HTTP mapping for [`RelayError`]

use crate::error::RelayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidReference(_)
            | Self::InvalidRequest(_)
            | Self::MalformedRequest { .. }
            | Self::PathTraversal(_)
            | Self::BinaryContentRejected(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CloneFailure(_) | Self::VcsFailure(_) | Self::DispatchFailure(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, details = ?self.details(), "Request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "Request rejected");
        }

        let mut body = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            body["details"] = json!(details);
        }
        if let Self::BinaryContentRejected(info) = &self {
            body["file"] = json!(info);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BinaryFileInfo;

    async fn body_of(err: RelayError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn statuses_follow_error_class() {
        let (status, body) = body_of(RelayError::AlreadyExists("repo".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Repository already exists: repo");
        assert!(body.get("details").is_none());

        let (status, _) = body_of(RelayError::PathTraversal("../x".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = body_of(RelayError::NotFound("gone".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn collaborator_failures_carry_details() {
        let (status, body) =
            body_of(RelayError::VcsFailure(anyhow::anyhow!("fatal: not a git repository"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "fatal: not a git repository");
    }

    #[tokio::test]
    async fn binary_rejection_reports_file_metadata() {
        let info = BinaryFileInfo {
            name: "logo.png".into(),
            path: "img/logo.png".into(),
            size: 42,
            modified: None,
            mime_type: "image/png".into(),
        };
        let (status, body) = body_of(RelayError::BinaryContentRejected(Box::new(info))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["file"]["mimeType"], "image/png");
        assert_eq!(body["file"]["size"], 42);
    }
}
