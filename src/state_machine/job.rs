use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::Stage;
use crate::error::BuildError;
use crate::platform::Platform;

/// Tracks the lifecycle status of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Completed | BuildStatus::Failed)
    }
}

/// Job-specific values patched into a skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// URL the packaged app loads on start.
    pub source_url: String,
    /// Display name of the app.
    pub app_name: String,
    /// Package name (Android, HarmonyOS) or bundle identifier (Apple).
    #[serde(default = "default_package_id")]
    pub package_id: String,
    #[serde(default = "default_version_name")]
    pub version_name: String,
    /// Build number. Kept as text because callers send whatever they have.
    #[serde(default = "default_version_code")]
    pub version_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy_policy: Option<String>,
    /// Object-storage path of the source icon image.
    #[serde(default)]
    pub icon: Option<String>,
}

fn default_package_id() -> String {
    "com.webforge.app".to_string()
}

fn default_version_name() -> String {
    "1.0.0".to_string()
}

fn default_version_code() -> String {
    "1".to_string()
}

impl AppConfig {
    pub fn new(source_url: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            app_name: app_name.into(),
            package_id: default_package_id(),
            version_name: default_version_name(),
            version_code: default_version_code(),
            description: None,
            privacy_policy: None,
            icon: None,
        }
    }

    /// Numeric version code; unparseable input falls back to 1.
    pub fn version_code_number(&self) -> u32 {
        self.version_code.trim().parse::<u32>().unwrap_or(1)
    }

    /// Description used for store listings and executable metadata.
    pub fn description_or_default(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.app_name.clone())
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        let url = self.source_url.trim();
        if url.is_empty() {
            return Err(BuildError::InvalidConfig("source URL must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BuildError::InvalidConfig(format!(
                "source URL must use http or https: {url}"
            )));
        }
        if self.app_name.trim().is_empty() {
            return Err(BuildError::InvalidConfig("app name must not be empty".into()));
        }
        Ok(())
    }
}

/// Where the finished artifact lives once a job completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub output_ref: String,
    pub download_url: String,
    pub size_bytes: u64,
}

/// A single build in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: String,
    pub platform: Platform,
    pub status: BuildStatus,
    pub stage: Option<Stage>,
    pub progress: u8,
    pub config: AppConfig,
    pub output_artifact_ref: Option<String>,
    pub download_url: Option<String>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BuildJob {
    pub fn new(id: impl Into<String>, platform: Platform, config: AppConfig) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            platform,
            status: BuildStatus::Pending,
            stage: None,
            progress: 0,
            config,
            output_artifact_ref: None,
            download_url: None,
            file_size_bytes: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot of the fields persisted to the job store.
    pub fn to_update(&self) -> JobUpdate {
        JobUpdate {
            status: self.status,
            progress: self.progress,
            stage: self.stage,
            timestamp: self.updated_at,
            output_artifact_ref: self.output_artifact_ref.clone(),
            download_url: self.download_url.clone(),
            file_size_bytes: self.file_size_bytes,
            error_message: self.error_message.clone(),
        }
    }
}

/// One persisted status write. Extra fields are only set on terminal writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: BuildStatus,
    pub progress: u8,
    pub stage: Option<Stage>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
