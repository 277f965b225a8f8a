pub mod client;
pub mod download;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use client::{API_URL, RemoteCiClient};
pub use download::{ArtifactDownloader, UnpackedArtifact, unpack_artifact};
pub use error::RemoteError;
pub use rate_limit::{RateLimitSnapshot, RateLimiter};
pub use types::{DispatchInputs, DispatchRequest, RunState, WorkflowRun};
