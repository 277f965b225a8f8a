//! Error type for the remote CI client.

use std::sync::Arc;

use thiserror::Error;

/// Failures talking to the CI provider.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP 429, or 403 with an exhausted budget. `reset_epoch` is when the
    /// provider refills it (0 when unknown).
    #[error("rate limited until {reset_epoch}")]
    RateLimited { reset_epoch: u64 },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("artifact {name:?} not found for run {run_id}")]
    ArtifactNotFound { run_id: u64, name: String },

    #[error("no workflow run found after dispatch")]
    NoRunFound,

    #[error("unexpected response: {0}")]
    Parse(String),

    /// Failure of a transfer shared between several requesters.
    #[error("{0}")]
    Shared(Arc<RemoteError>),
}
