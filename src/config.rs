//! Engine configuration loaded from `webforge.toml`.
//!
//! [`ForgeConfig`] holds storage layout and workspace settings; the optional
//! `[remote]` table configures the CI bridge. Missing keys use defaults.
//! `WEBFORGE_GITHUB_TOKEN` (then `GITHUB_TOKEN`) and `WEBFORGE_TEMP_DIR`
//! take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::remote::API_URL;

const CONFIG_FILE: &str = "webforge.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgeConfig {
    /// Storage prefix skeleton archives live under.
    #[serde(default = "default_skeleton_prefix")]
    pub skeleton_prefix: String,

    /// Skeleton version directory, e.g. `v1`.
    #[serde(default = "default_skeleton_version")]
    pub skeleton_version: String,

    /// Storage prefix build outputs are uploaded under.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Parent directory of build workspaces. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    #[serde(default)]
    pub remote: RemoteConfig,
}

/// The `[remote]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Build Android through CI instead of packaging the source bundle.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub repo: String,

    /// Workflow file name or id.
    #[serde(default = "default_workflow")]
    pub workflow: String,

    #[serde(default = "default_git_ref")]
    pub git_ref: String,

    #[serde(default)]
    pub token: String,

    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,

    /// Base URL the workflow reports back to; the build id is appended.
    #[serde(default)]
    pub callback_base_url: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Wait between dispatching and looking up the new run.
    #[serde(default = "default_dispatch_settle_secs")]
    pub dispatch_settle_secs: u64,
}

fn default_skeleton_prefix() -> String {
    "skeletons".to_string()
}

fn default_skeleton_version() -> String {
    "v1".to_string()
}

fn default_output_prefix() -> String {
    "builds".to_string()
}

fn default_api_base() -> String {
    API_URL.to_string()
}

fn default_workflow() -> String {
    "android-build.yml".to_string()
}

fn default_git_ref() -> String {
    "main".to_string()
}

fn default_artifact_name() -> String {
    "android-release".to_string()
}

fn default_poll_interval_secs() -> u64 {
    15
}

fn default_max_poll_attempts() -> u32 {
    120
}

fn default_dispatch_settle_secs() -> u64 {
    5
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            skeleton_prefix: default_skeleton_prefix(),
            skeleton_version: default_skeleton_version(),
            output_prefix: default_output_prefix(),
            temp_dir: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_api_base(),
            owner: String::new(),
            repo: String::new(),
            workflow: default_workflow(),
            git_ref: default_git_ref(),
            token: String::new(),
            artifact_name: default_artifact_name(),
            callback_base_url: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            dispatch_settle_secs: default_dispatch_settle_secs(),
        }
    }
}

impl ForgeConfig {
    /// Load `webforge.toml` from the current directory, falling back to
    /// defaults when it does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<ForgeConfig>(&contents)
                .with_context(|| format!("invalid config in {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(token) = var("WEBFORGE_GITHUB_TOKEN").or_else(|| var("GITHUB_TOKEN")) {
            self.remote.token = token;
        }
        if let Some(dir) = var("WEBFORGE_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl RemoteConfig {
    /// Whether enough is configured to talk to the CI provider.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.owner.is_empty() && !self.repo.is_empty() && !self.token.is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dispatch_settle(&self) -> Duration {
        Duration::from_secs(self.dispatch_settle_secs)
    }

    pub fn callback_url(&self, build_id: &str) -> String {
        if self.callback_base_url.is_empty() {
            return String::new();
        }
        format!("{}/{build_id}", self.callback_base_url.trim_end_matches('/'))
    }
}
