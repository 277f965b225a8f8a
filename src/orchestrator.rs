use std::path::{Path, PathBuf};

use tracing::Instrument;

use crate::config::{ForgeConfig, RemoteConfig};
use crate::error::BuildError;
use crate::icons::{self, IconOutcome};
use crate::package;
use crate::patcher;
use crate::platform::{Platform, WINDOWS_EXECUTABLE};
use crate::remote::{
    ArtifactDownloader, DispatchInputs, DispatchRequest, RateLimiter, RemoteCiClient, RunState,
    unpack_artifact,
};
use crate::rsrc;
use crate::state_machine::{AppConfig, Artifact, BuildJob, Stage, StateMachine, Transition};
use crate::storage::{JobStore, ObjectStorage};
use crate::workspace::{DEFAULT_MAX_DEPTH, Workspace, locate_project_root};

const REMOTE_POLL_STEP: u8 = 5;
const REMOTE_POLL_CAP: u8 = 80;
const REMOTE_UPLOAD_PROGRESS: u8 = 95;

/// CI bridge used for remote builds.
#[derive(Clone)]
pub struct RemoteBridge {
    pub client: RemoteCiClient,
    pub downloader: ArtifactDownloader,
    pub settings: RemoteConfig,
}

impl RemoteBridge {
    /// Bridge backed by the process-wide rate limiter and download map, or
    /// `None` when the `[remote]` table is disabled or incomplete.
    pub fn from_config(settings: &RemoteConfig) -> anyhow::Result<Option<Self>> {
        if !settings.is_usable() {
            return Ok(None);
        }
        let client = RemoteCiClient::new(
            settings.api_base.clone(),
            settings.token.clone(),
            settings.owner.clone(),
            settings.repo.clone(),
            RateLimiter::shared(),
        )?;
        Ok(Some(Self {
            client,
            downloader: ArtifactDownloader::shared(),
            settings: settings.clone(),
        }))
    }
}

/// Drives builds through the state machine, persisting every transition.
pub struct BuildOrchestrator<S, J> {
    storage: S,
    jobs: J,
    config: ForgeConfig,
    remote: Option<RemoteBridge>,
}

impl<S: ObjectStorage, J: JobStore> BuildOrchestrator<S, J> {
    /// Orchestrator running every platform locally.
    pub fn new(storage: S, jobs: J, config: ForgeConfig) -> Self {
        Self {
            storage,
            jobs,
            config,
            remote: None,
        }
    }

    /// Route Android builds through `bridge`.
    pub fn with_remote(mut self, bridge: RemoteBridge) -> Self {
        self.remote = Some(bridge);
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    fn bridge_for(&self, platform: Platform) -> Option<&RemoteBridge> {
        self.remote.as_ref().filter(|_| platform == Platform::Android)
    }

    /// Run one build to a terminal state and return the final job.
    ///
    /// Never returns an error: failures are recorded on the job and written
    /// to the job store like every other transition.
    pub async fn process_build(&self, job_id: &str, platform: Platform, config: AppConfig) -> BuildJob {
        let span = tracing::info_span!("build", build_id = job_id, platform = %platform);
        async move {
            let mut job = BuildJob::new(job_id, platform, config);
            tracing::info!(app = %job.config.app_name, "build started");

            let result = match job.config.validate() {
                Err(e) => Err(e),
                Ok(()) => match self.bridge_for(platform) {
                    Some(bridge) => self.run_remote(&mut job, bridge).await,
                    None => self.run_local(&mut job).await,
                },
            };

            match result {
                Ok(artifact) => {
                    let t = StateMachine::complete(&mut job, artifact);
                    self.persist(&job, &t).await;
                    tracing::info!(
                        output = job.output_artifact_ref.as_deref().unwrap_or_default(),
                        bytes = job.file_size_bytes.unwrap_or_default(),
                        "build completed"
                    );
                }
                Err(e) => {
                    tracing::error!(stage = ?job.stage, error = %e, "build failed");
                    let t = StateMachine::fail(&mut job, e.to_string());
                    self.persist(&job, &t).await;
                }
            }
            job
        }
        .instrument(span)
        .await
    }

    async fn advance(&self, job: &mut BuildJob, stage: Stage, progress: u8) {
        let t = StateMachine::advance(job, stage, progress);
        tracing::debug!(%stage, progress = job.progress, "stage entered");
        self.persist(job, &t).await;
    }

    /// Job-store failures never abort a build.
    async fn persist(&self, job: &BuildJob, transition: &Transition) {
        if !transition.is_applied() {
            return;
        }
        if let Err(e) = self.jobs.update_status(&job.id, job.to_update()).await {
            let error = format!("{e:#}");
            tracing::warn!(%error, "failed to persist job update");
        }
    }

    async fn run_local(&self, job: &mut BuildJob) -> Result<Artifact, BuildError> {
        let platform = job.platform;

        self.advance(job, Stage::FetchTemplate, Stage::FetchTemplate.progress()).await;
        let skeleton_path = format!(
            "{}/{}/{}",
            self.config.skeleton_prefix,
            self.config.skeleton_version,
            platform.skeleton_file_name()
        );
        let skeleton = self
            .storage
            .download_file(&skeleton_path)
            .await
            .map_err(|e| BuildError::TemplateFetch(format!("{e:#}")))?;

        self.advance(job, Stage::Extract, Stage::Extract.progress()).await;
        let temp_root = self.config.temp_root();
        let build_id = job.id.clone();
        let (workspace, root) = blocking(move || {
            let workspace = Workspace::create(&temp_root, &build_id)?;
            workspace.extract(&skeleton, platform.archive_format())?;
            let root = locate_project_root(workspace.path(), platform.markers(), DEFAULT_MAX_DEPTH)?;
            Ok((workspace, root))
        })
        .await?;
        tracing::debug!(root = %root.display(), "located project root");

        self.advance(job, Stage::Patch, Stage::Patch.progress()).await;
        let app = job.config.clone();
        let patch_root = root.clone();
        let report = blocking(move || patcher::patch_project(platform, &patch_root, &app)).await?;
        tracing::info!(written = report.written.len(), skipped = report.skipped.len(), "patched skeleton");

        self.advance(job, Stage::Icons, Stage::Icons.progress()).await;
        let source = self.fetch_icon(&job.config).await;
        let app = job.config.clone();
        let icon_root = root.clone();
        let outcome = blocking(move || icon_stage(platform, &icon_root, &app, source)).await?;
        log_icon_outcome(&outcome);

        self.advance(job, Stage::Package, Stage::Package.progress()).await;
        let archive = blocking(move || {
            let bytes = package::package(platform, &root)?;
            drop(workspace);
            Ok(bytes)
        })
        .await?;

        self.advance(job, Stage::Upload, Stage::Upload.progress()).await;
        let file_name = format!(
            "{}-{}.{}",
            slug(&job.config.app_name),
            platform.name(),
            platform.archive_format().extension()
        );
        self.upload(job, &file_name, archive).await
    }

    /// Source icon bytes. A configured icon that cannot be fetched is a soft
    /// failure and keeps the skeleton icons.
    async fn fetch_icon(&self, config: &AppConfig) -> Result<Option<Vec<u8>>, String> {
        let Some(path) = config.icon.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        self.storage
            .download_file(path)
            .await
            .map(Some)
            .map_err(|e| format!("failed to fetch icon {path}: {e:#}"))
    }

    async fn run_remote(&self, job: &mut BuildJob, bridge: &RemoteBridge) -> Result<Artifact, BuildError> {
        let client = &bridge.client;
        let settings = &bridge.settings;

        self.advance(job, Stage::Dispatch, Stage::Dispatch.progress()).await;
        let request = dispatch_request(&job.id, &job.config, settings);
        client
            .dispatch(&settings.workflow, &request)
            .await
            .map_err(|e| BuildError::RemoteDispatch(e.to_string()))?;
        tokio::time::sleep(settings.dispatch_settle()).await;
        let run = client
            .latest_dispatched_run(&settings.workflow)
            .await
            .map_err(|e| BuildError::RemoteDispatch(e.to_string()))?;
        tracing::info!(
            run_id = run.id,
            url = run.html_url.as_deref().unwrap_or_default(),
            rate_limit = ?client.limiter().snapshot(),
            "tracking remote run"
        );

        self.advance(job, Stage::RemoteBuild, Stage::RemoteBuild.progress()).await;
        let mut progress = Stage::RemoteBuild.progress();
        let mut attempts = 0;
        loop {
            if attempts >= settings.max_poll_attempts {
                return Err(BuildError::RemotePoll(format!(
                    "run {} still unfinished after {attempts} polls",
                    run.id
                )));
            }
            attempts += 1;
            let interval = client.limiter().recommended_interval(settings.poll_interval());
            tokio::time::sleep(interval).await;

            match client.run_state(run.id).await {
                RunState::Succeeded => break,
                RunState::Failed(reason) => return Err(BuildError::RemotePoll(reason)),
                state @ (RunState::Queued | RunState::Running) => {
                    progress = progress.saturating_add(REMOTE_POLL_STEP).min(REMOTE_POLL_CAP);
                    tracing::debug!(run_id = run.id, attempts, ?state, "remote run pending");
                    self.advance(job, Stage::RemoteBuild, progress).await;
                }
            }
        }

        self.advance(job, Stage::Download, Stage::Download.progress()).await;
        let name = settings.artifact_name.clone();
        let zip = bridge.downloader.download(client, run.id, &name).await?;
        let unpacked = blocking(move || Ok(unpack_artifact(&name, &zip)?)).await?;

        self.advance(job, Stage::Upload, REMOTE_UPLOAD_PROGRESS).await;
        self.upload(job, &unpacked.file_name, unpacked.bytes).await
    }

    async fn upload(&self, job: &BuildJob, file_name: &str, bytes: Vec<u8>) -> Result<Artifact, BuildError> {
        let output_ref = format!("{}/{}/{file_name}", self.config.output_prefix, job.id);
        let size_bytes = bytes.len() as u64;
        self.storage
            .upload_file(&output_ref, bytes)
            .await
            .map_err(|e| BuildError::Upload(format!("{e:#}")))?;
        let download_url = self
            .storage
            .temp_download_url(&output_ref)
            .await
            .map_err(|e| BuildError::Upload(format!("{e:#}")))?;
        Ok(Artifact {
            output_ref,
            download_url,
            size_bytes,
        })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, BuildError>
where
    F: FnOnce() -> Result<T, BuildError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Icons for the project at `root`, plus executable branding on Windows.
///
/// Only a failed resource edit is fatal; everything else degrades to the
/// skeleton's own icons.
fn icon_stage(
    platform: Platform,
    root: &Path,
    config: &AppConfig,
    source: Result<Option<Vec<u8>>, String>,
) -> Result<IconOutcome, BuildError> {
    let outcome = match source {
        Err(reason) => IconOutcome::SoftFailed(reason),
        Ok(bytes) => icons::generate(platform, &icons::icon_base(platform, root), bytes.as_deref()),
    };
    if platform != Platform::Windows {
        return Ok(outcome);
    }

    let ico = match &outcome {
        IconOutcome::Applied(artifacts) => artifacts.ico.clone(),
        _ => None,
    };
    let exe: PathBuf = root.join(WINDOWS_EXECUTABLE);
    let branded = match rsrc::brand_executable(&exe, config, ico.as_deref()) {
        Ok(branded) => branded,
        Err(e) => IconOutcome::HardFailed(e.to_string()),
    };
    match (outcome, branded) {
        (_, IconOutcome::HardFailed(reason)) => Err(BuildError::ResourceEdit(reason)),
        (IconOutcome::Applied(mut artifacts), IconOutcome::Applied(exe)) => {
            artifacts.written.extend(exe.written);
            Ok(IconOutcome::Applied(artifacts))
        }
        (_, soft @ IconOutcome::SoftFailed(_)) => Ok(soft),
        (outcome, _) => Ok(outcome),
    }
}

fn log_icon_outcome(outcome: &IconOutcome) {
    match outcome {
        IconOutcome::Applied(artifacts) => {
            tracing::debug!(files = ?artifacts.written, "icons applied");
        }
        IconOutcome::Skipped => tracing::debug!("no icon configured, keeping skeleton icons"),
        IconOutcome::SoftFailed(reason) => {
            tracing::warn!(%reason, "icon step failed, keeping skeleton icons");
        }
        IconOutcome::HardFailed(reason) => tracing::error!(%reason, "icon step failed"),
    }
}

fn dispatch_request(build_id: &str, config: &AppConfig, settings: &RemoteConfig) -> DispatchRequest {
    DispatchRequest {
        git_ref: settings.git_ref.clone(),
        inputs: DispatchInputs {
            build_id: build_id.to_string(),
            source_url: config.source_url.clone(),
            callback_url: settings.callback_url(build_id),
            app_name: config.app_name.clone(),
            package_id: config.package_id.clone(),
            version_name: config.version_name.clone(),
            version_code: config.version_code_number().to_string(),
        },
    }
}

/// File-name friendly form of an app name.
fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_matches('-');
    if out.is_empty() {
        "app".to_string()
    } else {
        out.to_string()
    }
}
