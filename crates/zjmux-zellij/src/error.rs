//! Error types for the zellij backend.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZellijError {
    #[error("zellij {command} timed out after {}ms", after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("zellij command failed: {0}")]
    CommandFailed(String),

    #[error("zellij binary not found: {0}")]
    NotFound(String),

    #[error("zellij io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response ({detail}): {raw}")]
    MalformedResponse { detail: String, raw: String },

    #[error("control plane unavailable: {0}")]
    ControlPlaneUnavailable(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("attachment failed: {0}")]
    AttachmentFailed(String),
}

impl ZellijError {
    /// Failures that mean "use the text-based path instead".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ControlPlaneUnavailable(_) | Self::NotFound(_))
    }
}
