//! Storage and publish errors

use std::path::PathBuf;

/// Object store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unreachable: {0}")]
    Transport(String),

    #[error("storage returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("storage configuration error: {0}")]
    Config(String),
}

/// Artifact publish failure
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// File disappeared between discovery and upload, even after one retry
    #[error("artifact vanished before upload: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("failed to read artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("upload failed: {0}")]
    Store(#[from] StoreError),
}

impl PublishError {
    /// Check if a later attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(StoreError::Transport(_)) => true,
            Self::Store(StoreError::Http { status, .. }) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
