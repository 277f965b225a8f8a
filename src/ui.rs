//! Terminal output for the `webforge` binary: a progress bar fed by job
//! updates and colored summaries.

use std::time::Duration;

use anyhow::Result;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use webforge::remote::RateLimitSnapshot;
use webforge::{BuildJob, BuildStatus, JobStore, JobUpdate};

/// Job store that renders each status write on a progress bar.
pub struct TerminalProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl TerminalProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new(100);
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb.set_message(format!("{label}: pending"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Clear the bar and print the final state of `job`.
    pub fn finish(&self, job: &BuildJob) {
        self.pb.finish_and_clear();
        match job.status {
            BuildStatus::Completed => {
                println!(
                    "  {} {} build completed ({} bytes)",
                    self.green.apply_to("✓"),
                    job.platform,
                    job.file_size_bytes.unwrap_or_default()
                );
                if let Some(output) = &job.output_artifact_ref {
                    println!("    {} {output}", self.dim.apply_to("output:"));
                }
                if let Some(url) = &job.download_url {
                    println!("    {} {url}", self.dim.apply_to("download:"));
                }
            }
            _ => {
                println!(
                    "  {} {} build failed: {}",
                    self.red.apply_to("✗"),
                    job.platform,
                    job.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
}

impl JobStore for TerminalProgress {
    async fn update_status(&self, _job_id: &str, update: JobUpdate) -> Result<()> {
        self.pb.set_position(u64::from(update.progress));
        let stage = update
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "PENDING".to_string());
        self.pb.set_message(stage);
        Ok(())
    }
}

/// Print a rate-limit snapshot with the share used highlighted.
pub fn print_rate_limit(snapshot: &RateLimitSnapshot) {
    let ratio = snapshot.used_ratio();
    let style = if ratio > 0.8 {
        Style::new().red().bold()
    } else {
        Style::new().green()
    };
    let reset = chrono::DateTime::from_timestamp(snapshot.reset_epoch as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| snapshot.reset_epoch.to_string());
    println!(
        "  {} of {} requests left ({}% used), resets at {reset}",
        snapshot.remaining,
        snapshot.limit,
        style.apply_to(format!("{:.0}", ratio * 100.0))
    );
}
