mod cli;
mod ui;

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use webforge::icons::{self, IconOutcome, IconPlan};
use webforge::{AppConfig, BuildOrchestrator, ForgeConfig, LocalStorage, Platform, RemoteBridge};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ForgeConfig::load_from(&cli.config)?;

    match cli.command {
        Command::Build {
            platform,
            storage,
            app,
            url,
            name,
            icon,
            job_id,
        } => {
            let mut app_config = match app {
                Some(path) => load_app_config(&path)?,
                None => AppConfig::new(String::new(), String::new()),
            };
            if let Some(url) = url {
                app_config.source_url = url;
            }
            if let Some(name) = name {
                app_config.app_name = name;
            }
            if icon.is_some() {
                app_config.icon = icon;
            }
            let job_id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            run_build(config, &storage, &job_id, platform, app_config).await
        }
        Command::Icons {
            source,
            platform,
            out,
        } => render_icons(&source, platform, &out),
        Command::RateLimit => {
            let Some(bridge) = RemoteBridge::from_config(&config.remote)? else {
                bail!("the [remote] table needs enabled = true, owner, repo and a token");
            };
            let snapshot = bridge.client.rate_limit().await?;
            ui::print_rate_limit(&snapshot);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "webforge=debug" } else { "webforge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read an [`AppConfig`] from a `.json` file, or TOML otherwise.
fn load_app_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid app config in {}", path.display()))?
    } else {
        toml::from_str(&contents)
            .with_context(|| format!("invalid app config in {}", path.display()))?
    };
    Ok(config)
}

async fn run_build(
    config: ForgeConfig,
    storage: &Path,
    job_id: &str,
    platform: Platform,
    app: AppConfig,
) -> Result<()> {
    let bridge = RemoteBridge::from_config(&config.remote)?;
    let progress = ui::TerminalProgress::start(&format!("{platform} {job_id}"));
    let mut orchestrator = BuildOrchestrator::new(LocalStorage::new(storage), progress, config);
    if let Some(bridge) = bridge {
        orchestrator = orchestrator.with_remote(bridge);
    }

    let job = orchestrator.process_build(job_id, platform, app).await;
    orchestrator.jobs().finish(&job);
    if let Some(message) = job.error_message {
        bail!("build {job_id} failed: {message}");
    }
    Ok(())
}

/// Render every icon the platform uses below `out`, creating the
/// directories the pipeline expects to find.
fn render_icons(source: &Path, platform: Platform, out: &Path) -> Result<()> {
    let bytes = std::fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
    let plan = IconPlan::for_platform(platform);
    let targets = plan
        .specs
        .iter()
        .map(|s| s.path)
        .chain(plan.ico.map(|t| t.path))
        .chain(plan.icns);
    for rel in targets {
        let dest = out.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    match icons::generate(platform, out, Some(bytes.as_slice())) {
        IconOutcome::Applied(artifacts) => {
            for file in &artifacts.written {
                println!("  {}", out.join(file).display());
            }
            Ok(())
        }
        IconOutcome::SoftFailed(reason) | IconOutcome::HardFailed(reason) => bail!(reason),
        IconOutcome::Skipped => Ok(()),
    }
}
