use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::RemoteError;
use super::rate_limit::{RateLimitSnapshot, RateLimiter};
use super::types::{
    ArtifactList, DispatchRequest, RateLimitResponse, RunArtifact, RunState, WorkflowRun,
    WorkflowRunList,
};

pub const API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("webforge/", env!("CARGO_PKG_VERSION"));

/// Deadline for one JSON API call, body included.
const API_TIMEOUT: Duration = Duration::from_secs(60);
/// Longest silence tolerated on any socket read, downloads included.
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Log download throughput at most this often.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// GitHub Actions client for one repository.
///
/// Cloning is cheap and clones share the HTTP pool and the rate limiter.
#[derive(Debug, Clone)]
pub struct RemoteCiClient {
    client: Client,
    base_url: String,
    token: String,
    owner: String,
    repo: String,
    limiter: RateLimiter,
    api_timeout: Duration,
}

impl RemoteCiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        limiter: RateLimiter,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(READ_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            limiter,
            api_timeout: API_TIMEOUT,
        })
    }

    /// Override the per-call deadline of API requests. Artifact transfers
    /// are only bounded by the read timeout.
    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn repo_url(&self, rest: &str) -> String {
        format!("{}/repos/{}/{}/{rest}", self.base_url, self.owner, self.repo)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", API_VERSION);
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// Send, record the rate-limit headers and turn failures into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorized(request).send().await?;
        self.limiter.update_from_headers(response.headers());

        let status = response.status();
        let exhausted = RateLimitSnapshot::from_headers(response.headers())
            .is_some_and(|s| s.remaining == 0);
        if status == StatusCode::TOO_MANY_REQUESTS
            || (status == StatusCode::FORBIDDEN && exhausted)
        {
            let reset_epoch = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            return Err(RemoteError::RateLimited { reset_epoch });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RemoteError::ApiError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let response = self
            .send(self.client.get(url).timeout(self.api_timeout))
            .await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Parse(e.to_string()))
    }

    /// Trigger a `workflow_dispatch` run.
    pub async fn dispatch(&self, workflow: &str, request: &DispatchRequest) -> Result<(), RemoteError> {
        let url = self.repo_url(&format!("actions/workflows/{workflow}/dispatches"));
        self.send(self.client.post(&url).timeout(self.api_timeout).json(request))
            .await?;
        tracing::info!(
            workflow,
            build_id = %request.inputs.build_id,
            "dispatched remote build"
        );
        Ok(())
    }

    /// Newest `workflow_dispatch` run of `workflow`.
    ///
    /// The dispatch endpoint does not return a run id, so two dispatches
    /// racing within the settle window can pick up each other's run.
    pub async fn latest_dispatched_run(&self, workflow: &str) -> Result<WorkflowRun, RemoteError> {
        let url = self.repo_url(&format!(
            "actions/workflows/{workflow}/runs?event=workflow_dispatch&per_page=5"
        ));
        let list: WorkflowRunList = self.get_json(&url).await?;
        list.workflow_runs
            .into_iter()
            .max_by_key(|run| run.created_at)
            .ok_or(RemoteError::NoRunFound)
    }

    pub async fn get_run(&self, run_id: u64) -> Result<WorkflowRun, RemoteError> {
        self.get_json(&self.repo_url(&format!("actions/runs/{run_id}")))
            .await
    }

    /// Poll a run. Transport and HTTP failures count as a failed run.
    pub async fn run_state(&self, run_id: u64) -> RunState {
        match self.get_run(run_id).await {
            Ok(run) => RunState::from_run(&run),
            Err(e) => RunState::Failed(e.to_string()),
        }
    }

    pub async fn list_artifacts(&self, run_id: u64) -> Result<Vec<RunArtifact>, RemoteError> {
        let list: ArtifactList = self
            .get_json(&self.repo_url(&format!("actions/runs/{run_id}/artifacts")))
            .await?;
        Ok(list.artifacts)
    }

    /// Download the zip GitHub wraps an artifact in, streaming the body.
    pub async fn download_artifact(&self, run_id: u64, name: &str) -> Result<Vec<u8>, RemoteError> {
        let artifact = self
            .list_artifacts(run_id)
            .await?
            .into_iter()
            .find(|a| a.name == name && !a.expired)
            .ok_or_else(|| RemoteError::ArtifactNotFound {
                run_id,
                name: name.to_string(),
            })?;

        let mut response = self
            .send(self.client.get(&artifact.archive_download_url))
            .await?;
        let expected = response
            .content_length()
            .unwrap_or(artifact.size_in_bytes);
        let mut body = Vec::with_capacity(expected as usize);

        let started = Instant::now();
        let mut last_log = started;
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                last_log = Instant::now();
                let secs = started.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    run_id,
                    received = body.len(),
                    expected,
                    kib_per_sec = (body.len() as f64 / 1024.0 / secs) as u64,
                    "downloading artifact"
                );
            }
        }
        tracing::info!(
            run_id,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "artifact downloaded"
        );
        Ok(body)
    }

    /// Current core budget from `GET /rate_limit`. Also refreshes the
    /// shared limiter.
    pub async fn rate_limit(&self) -> Result<RateLimitSnapshot, RemoteError> {
        let body: RateLimitResponse = self
            .get_json(&format!("{}/rate_limit", self.base_url))
            .await?;
        let snapshot = RateLimitSnapshot {
            limit: body.rate.limit,
            remaining: body.rate.remaining,
            reset_epoch: body.rate.reset,
            used: body.rate.used,
        };
        self.limiter.update(snapshot);
        Ok(snapshot)
    }
}
