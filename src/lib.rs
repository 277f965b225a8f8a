//! Turns a web address and an app configuration into platform-native app
//! bundles.
//!
//! A build fetches a prebuilt skeleton for the target platform, patches it
//! with the job's values, regenerates its icons, repackages it and uploads
//! the result. Android builds can instead be delegated to a CI workflow.
//! [`BuildOrchestrator::process_build`] is the entry point.

pub mod config;
pub mod error;
pub mod icons;
pub mod orchestrator;
pub mod package;
pub mod patcher;
pub mod platform;
pub mod remote;
pub mod rsrc;
pub mod state_machine;
pub mod storage;
pub mod workspace;

pub use config::ForgeConfig;
pub use error::BuildError;
pub use orchestrator::{BuildOrchestrator, RemoteBridge};
pub use platform::Platform;
pub use state_machine::{AppConfig, BuildJob, BuildStatus, JobUpdate};
pub use storage::{JobStore, LocalStorage, MemoryJobStore, ObjectStorage};
