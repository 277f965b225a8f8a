//! Request and response bodies of the GitHub Actions REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST .../workflows/{workflow}/dispatches`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRequest {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub inputs: DispatchInputs,
}

/// Workflow inputs. The API only accepts strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchInputs {
    pub build_id: String,
    pub source_url: String,
    pub callback_url: String,
    pub app_name: String,
    pub package_id: String,
    pub version_name: String,
    pub version_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub total_count: u64,
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunArtifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    #[serde(default)]
    pub total_count: u64,
    pub artifacts: Vec<RunArtifact>,
}

/// One bucket of `GET /rate_limit`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitBucket {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
    #[serde(default)]
    pub used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub rate: RateLimitBucket,
}

/// Where a remote run stands, as far as the orchestrator cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Queued,
    Running,
    Succeeded,
    Failed(String),
}

impl RunState {
    pub fn from_run(run: &WorkflowRun) -> Self {
        match (run.status.as_str(), run.conclusion.as_deref()) {
            ("completed", Some("success")) => RunState::Succeeded,
            ("completed", Some(conclusion)) => {
                RunState::Failed(format!("run {} concluded with {conclusion}", run.id))
            }
            ("completed", None) => RunState::Failed(format!("run {} completed without a conclusion", run.id)),
            ("queued" | "waiting" | "pending" | "requested", _) => RunState::Queued,
            _ => RunState::Running,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: &str, conclusion: Option<&str>) -> WorkflowRun {
        WorkflowRun {
            id: 42,
            status: status.into(),
            conclusion: conclusion.map(String::from),
            created_at: Utc::now(),
            html_url: None,
        }
    }

    #[test]
    fn dispatch_body_uses_ref_key() {
        let req = DispatchRequest {
            git_ref: "main".into(),
            inputs: DispatchInputs {
                build_id: "b1".into(),
                source_url: "https://example.com".into(),
                callback_url: String::new(),
                app_name: "Demo".into(),
                package_id: "com.demo".into(),
                version_name: "1.0.0".into(),
                version_code: "1".into(),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["ref"], "main");
        assert_eq!(json["inputs"]["build_id"], "b1");
        assert!(json.get("git_ref").is_none());
    }

    #[test]
    fn run_states() {
        assert_eq!(RunState::from_run(&run("queued", None)), RunState::Queued);
        assert_eq!(RunState::from_run(&run("in_progress", None)), RunState::Running);
        assert_eq!(RunState::from_run(&run("completed", Some("success"))), RunState::Succeeded);
        assert_eq!(
            RunState::from_run(&run("completed", Some("failure"))),
            RunState::Failed("run 42 concluded with failure".into())
        );
        assert!(RunState::from_run(&run("completed", Some("cancelled"))).is_finished());
        assert!(!RunState::Running.is_finished());
    }

    #[test]
    fn parses_run_list() {
        let body = r#"{
            "total_count": 1,
            "workflow_runs": [{
                "id": 7, "status": "queued", "conclusion": null,
                "created_at": "2024-05-01T10:00:00Z", "name": "build"
            }]
        }"#;
        let list: WorkflowRunList = serde_json::from_str(body).unwrap();
        assert_eq!(list.workflow_runs[0].id, 7);
        assert_eq!(list.workflow_runs[0].conclusion, None);
    }
}
