mod job;
mod state;

pub use job::{AppConfig, Artifact, BuildJob, BuildStatus, JobUpdate};
pub use state::{Stage, StateMachine, Transition};
