//! Error taxonomy shared by every component.
//!
//! Component failures are expressed as [`RelayError`] and translated into an
//! HTTP status at the request boundary (see `server::error`).

use serde::Serialize;
use thiserror::Error;

/// Metadata reported for a file whose content was withheld.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BinaryFileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid repository reference: {0}")]
    InvalidReference(String),

    #[error("{0}")]
    InvalidRequest(String),

    /// Body or query string that could not be decoded
    #[error("{message}")]
    MalformedRequest {
        message: &'static str,
        details: String,
    },

    #[error("Repository already exists: {0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    #[error("Binary file content cannot be displayed: {}", .0.path)]
    BinaryContentRejected(Box<BinaryFileInfo>),

    #[error("Failed to clone repository")]
    CloneFailure(#[source] anyhow::Error),

    #[error("Git operation failed")]
    VcsFailure(#[source] anyhow::Error),

    #[error("Prompt dispatch failed")]
    DispatchFailure(#[source] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Underlying collaborator message, if this error wraps one.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::CloneFailure(cause) | Self::VcsFailure(cause) | Self::DispatchFailure(cause) => {
                Some(format!("{:#}", cause))
            }
            Self::MalformedRequest { details, .. } => Some(details.clone()),
            Self::Io(e) => Some(e.to_string()),
            _ => None,
        }
    }

    /// Short machine-friendly tag for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "invalidReference",
            Self::InvalidRequest(_) => "invalidRequest",
            Self::MalformedRequest { .. } => "malformedRequest",
            Self::AlreadyExists(_) => "alreadyExists",
            Self::NotFound(_) => "notFound",
            Self::PathTraversal(_) => "pathTraversal",
            Self::BinaryContentRejected(_) => "binaryContentRejected",
            Self::CloneFailure(_) => "cloneFailure",
            Self::VcsFailure(_) => "vcsFailure",
            Self::DispatchFailure(_) => "dispatchFailure",
            Self::Io(_) => "io",
        }
    }
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;
