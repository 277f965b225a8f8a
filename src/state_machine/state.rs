use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::job::{Artifact, BuildJob, BuildStatus};

/// Pipeline stages a build passes through.
///
/// Local builds walk FETCH_TEMPLATE → EXTRACT → PATCH → ICONS → PACKAGE → UPLOAD;
/// remote builds walk DISPATCH → REMOTE_BUILD → DOWNLOAD → UPLOAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchTemplate,
    Extract,
    Patch,
    Icons,
    Package,
    Dispatch,
    RemoteBuild,
    Download,
    Upload,
}

impl Stage {
    /// Progress reported when the stage is entered.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::FetchTemplate => 10,
            Stage::Extract => 20,
            Stage::Patch => 40,
            Stage::Icons => 60,
            Stage::Package => 80,
            Stage::Dispatch => 15,
            Stage::RemoteBuild => 20,
            Stage::Download => 85,
            Stage::Upload => 90,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FetchTemplate => write!(f, "FETCH_TEMPLATE"),
            Stage::Extract => write!(f, "EXTRACT"),
            Stage::Patch => write!(f, "PATCH"),
            Stage::Icons => write!(f, "ICONS"),
            Stage::Package => write!(f, "PACKAGE"),
            Stage::Dispatch => write!(f, "DISPATCH"),
            Stage::RemoteBuild => write!(f, "REMOTE_BUILD"),
            Stage::Download => write!(f, "DOWNLOAD"),
            Stage::Upload => write!(f, "UPLOAD"),
        }
    }
}

/// The result of asking the state machine to move a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The job is processing the given stage at the given progress.
    Advanced { stage: Stage, progress: u8 },
    /// The job finished successfully.
    Completed,
    /// The job failed with the given message.
    Failed(String),
    /// The job was already terminal; nothing changed.
    Ignored,
}

impl Transition {
    /// Whether the job changed and the new state should be persisted.
    pub fn is_applied(&self) -> bool {
        !matches!(self, Transition::Ignored)
    }
}

/// Drives a `BuildJob` through pending → processing → {completed, failed}.
pub struct StateMachine;

impl StateMachine {
    /// Enter `stage` reporting `progress`.
    ///
    /// Pending jobs become processing. Progress is clamped to 100 and never
    /// goes backwards: a lower value keeps the current progress.
    pub fn advance(job: &mut BuildJob, stage: Stage, progress: u8) -> Transition {
        if job.status.is_terminal() {
            return Transition::Ignored;
        }
        job.status = BuildStatus::Processing;
        job.stage = Some(stage);
        job.progress = job.progress.max(progress.min(100));
        job.updated_at = Utc::now();
        Transition::Advanced {
            stage,
            progress: job.progress,
        }
    }

    /// Mark the job completed with its uploaded artifact.
    pub fn complete(job: &mut BuildJob, artifact: Artifact) -> Transition {
        if job.status.is_terminal() {
            return Transition::Ignored;
        }
        job.status = BuildStatus::Completed;
        job.progress = 100;
        job.output_artifact_ref = Some(artifact.output_ref);
        job.download_url = Some(artifact.download_url);
        job.file_size_bytes = Some(artifact.size_bytes);
        job.updated_at = Utc::now();
        Transition::Completed
    }

    /// Mark the job failed, keeping the message verbatim.
    pub fn fail(job: &mut BuildJob, message: impl Into<String>) -> Transition {
        if job.status.is_terminal() {
            return Transition::Ignored;
        }
        let message = message.into();
        job.status = BuildStatus::Failed;
        job.error_message = Some(message.clone());
        job.updated_at = Utc::now();
        Transition::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::state_machine::AppConfig;

    fn make_job() -> BuildJob {
        BuildJob::new(
            "job-1",
            Platform::Android,
            AppConfig::new("https://example.com", "Example"),
        )
    }

    fn artifact() -> Artifact {
        Artifact {
            output_ref: "builds/job-1.zip".into(),
            download_url: "https://cdn/job-1.zip".into(),
            size_bytes: 1234,
        }
    }

    #[test]
    fn happy_path_walks_all_stages() {
        let mut job = make_job();
        let stages = [
            Stage::FetchTemplate,
            Stage::Extract,
            Stage::Patch,
            Stage::Icons,
            Stage::Package,
            Stage::Upload,
        ];
        let mut last = 0;
        for stage in stages {
            let t = StateMachine::advance(&mut job, stage, stage.progress());
            assert_eq!(
                t,
                Transition::Advanced {
                    stage,
                    progress: stage.progress()
                }
            );
            assert_eq!(job.status, BuildStatus::Processing);
            assert!(job.progress >= last);
            last = job.progress;
        }

        assert_eq!(StateMachine::complete(&mut job, artifact()), Transition::Completed);
        assert_eq!(job.status, BuildStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.file_size_bytes, Some(1234));
        assert_eq!(job.download_url.as_deref(), Some("https://cdn/job-1.zip"));
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = make_job();
        StateMachine::advance(&mut job, Stage::Package, 80);
        let t = StateMachine::advance(&mut job, Stage::Patch, 40);
        assert_eq!(
            t,
            Transition::Advanced {
                stage: Stage::Patch,
                progress: 80
            }
        );
        assert_eq!(job.progress, 80);
    }

    #[test]
    fn progress_is_clamped() {
        let mut job = make_job();
        StateMachine::advance(&mut job, Stage::RemoteBuild, 250);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn failure_keeps_message_verbatim() {
        let mut job = make_job();
        StateMachine::advance(&mut job, Stage::Patch, 40);
        let t = StateMachine::fail(&mut job, "Config patch failed: manifest.json: missing");
        assert_eq!(
            t,
            Transition::Failed("Config patch failed: manifest.json: missing".into())
        );
        assert_eq!(job.status, BuildStatus::Failed);
        assert_eq!(job.progress, 40);
        assert!(job.download_url.is_none());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = make_job();
        StateMachine::fail(&mut job, "boom");

        assert_eq!(StateMachine::advance(&mut job, Stage::Extract, 20), Transition::Ignored);
        assert_eq!(StateMachine::complete(&mut job, artifact()), Transition::Ignored);
        assert_eq!(StateMachine::fail(&mut job, "again"), Transition::Ignored);
        assert_eq!(job.status, BuildStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));

        let mut done = make_job();
        StateMachine::complete(&mut done, artifact());
        assert_eq!(StateMachine::fail(&mut done, "late"), Transition::Ignored);
        assert_eq!(done.status, BuildStatus::Completed);
    }

    #[test]
    fn pending_job_can_fail_directly() {
        let mut job = make_job();
        StateMachine::fail(&mut job, "invalid config");
        assert_eq!(job.status, BuildStatus::Failed);
        assert!(job.stage.is_none());
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::FetchTemplate.to_string(), "FETCH_TEMPLATE");
        assert_eq!(Stage::RemoteBuild.to_string(), "REMOTE_BUILD");
        assert_eq!(Stage::Upload.to_string(), "UPLOAD");
    }
}
