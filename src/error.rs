use thiserror::Error;

use crate::remote::RemoteError;
use crate::rsrc::PeError;

/// Fatal and soft failures raised while building a job.
///
/// The `Display` text of a variant is what ends up in the job's
/// `error_message`, so messages are written for the end user.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to fetch skeleton template: {0}")]
    TemplateFetch(String),

    #[error("Invalid skeleton structure: {0}")]
    InvalidSkeletonStructure(String),

    #[error("Config patch failed: {0}")]
    ConfigPatch(String),

    #[error("Icon generation failed: {0}")]
    IconGeneration(String),

    #[error("Resource edit failed: {0}")]
    ResourceEdit(String),

    #[error("Repackaging failed: {0}")]
    Repackaging(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Remote dispatch failed: {0}")]
    RemoteDispatch(String),

    #[error("Remote build failed: {0}")]
    RemotePoll(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    pub fn config_patch(file: &str, reason: impl std::fmt::Display) -> Self {
        BuildError::ConfigPatch(format!("{file}: {reason}"))
    }
}

impl From<PeError> for BuildError {
    fn from(err: PeError) -> Self {
        BuildError::ResourceEdit(err.to_string())
    }
}

impl From<RemoteError> for BuildError {
    fn from(err: RemoteError) -> Self {
        BuildError::RemotePoll(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BuildError {
    fn from(err: tokio::task::JoinError) -> Self {
        BuildError::Io(std::io::Error::other(err.to_string()))
    }
}
