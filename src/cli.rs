//! Command line interface of the `webforge` developer harness.
//!
//! [`Cli`] carries the global flags; [`Command`] the subcommands (build,
//! icons, rate-limit).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use webforge::Platform;

/// webforge: package a web address as a platform-native app.
#[derive(Debug, Parser)]
#[command(name = "webforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Engine configuration file.
    #[arg(long, global = true, default_value = "webforge.toml")]
    pub config: PathBuf,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one build against a local storage directory.
    Build {
        /// Target platform.
        platform: Platform,

        /// Directory serving as object storage (skeletons in, builds out).
        #[arg(long, default_value = ".")]
        storage: PathBuf,

        /// App configuration file, TOML or JSON.
        #[arg(long)]
        app: Option<PathBuf>,

        /// URL the app loads. Overrides the app file.
        #[arg(long)]
        url: Option<String>,

        /// App name. Overrides the app file.
        #[arg(long)]
        name: Option<String>,

        /// Storage path of the source icon. Overrides the app file.
        #[arg(long)]
        icon: Option<String>,

        /// Job id; a random one is generated when omitted.
        #[arg(long)]
        job_id: Option<String>,
    },

    /// Render a platform's icon set from one image.
    Icons {
        /// Source image (PNG, JPEG, GIF, WebP, BMP or ICO).
        source: PathBuf,

        #[arg(long)]
        platform: Platform,

        /// Output directory.
        #[arg(long, default_value = "icons-out")]
        out: PathBuf,
    },

    /// Show the CI provider's remaining request budget.
    RateLimit,
}
