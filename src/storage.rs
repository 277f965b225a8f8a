//! Collaborator interfaces the engine consumes: object storage for skeletons
//! and artifacts, and the job record store that receives status writes.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;

use crate::state_machine::JobUpdate;

/// Blob storage holding skeleton templates, source icons and build outputs.
pub trait ObjectStorage: Send + Sync {
    fn download_file(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn upload_file(&self, path: &str, bytes: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// A short-lived URL the end user can fetch the object from.
    fn temp_download_url(&self, path: &str) -> impl Future<Output = Result<String>> + Send;
}

/// External store of job records. Writes are last-value-wins.
pub trait JobStore: Send + Sync {
    fn update_status(&self, job_id: &str, update: JobUpdate) -> impl Future<Output = Result<()>> + Send;
}

/// Object storage backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("storage path must be relative without '..': {path}");
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStorage for LocalStorage {
    async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read {}", full.display()))
    }

    async fn upload_file(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write {}", full.display()))
    }

    async fn temp_download_url(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            bail!("no such object: {path}");
        }
        Ok(format!("file://{}", full.display()))
    }
}

/// Job store that keeps every write in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    updates: Arc<Mutex<Vec<(String, JobUpdate)>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes recorded for `job_id`, oldest first.
    pub fn history(&self, job_id: &str) -> Vec<JobUpdate> {
        self.updates
            .lock()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, u)| u.clone())
            .collect()
    }

    pub fn latest(&self, job_id: &str) -> Option<JobUpdate> {
        self.history(job_id).pop()
    }
}

impl JobStore for MemoryJobStore {
    async fn update_status(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        self.updates.lock().push((job_id.to_string(), update));
        Ok(())
    }
}
