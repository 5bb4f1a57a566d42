//! CLI argument definitions for lamblayer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::archive::WrapDirs;
use crate::create::ContentSource;
use crate::error::Result;
use crate::fetch::DEFAULT_BUILD_SERVICE_URL;
use crate::logging::LogLevel;
use crate::poll::PollPolicy;
use crate::session::SessionOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// A minimal deployment tool for AWS Lambda layers.
#[derive(Parser, Debug)]
#[command(name = "lamblayer")]
#[command(version, about)]
#[command(long_about = concat!(
    "A minimal deployment tool for AWS Lambda layers.\n\n",
    "lamblayer publishes a new layer version either from a local source ",
    "directory, which is zipped under optional wrap directories, or from a ",
    "dependency bundle built by a remote packaging service.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Publish a python layer from a local directory:\n",
    "    $ lamblayer create --src ./deps --wrap-dir1 python --layer layer.json\n\n",
    "  Publish a layer from a remotely built dependency bundle:\n",
    "    $ lamblayer create --packages packages.json --layer layer.json\n\n",
    "  Preview without publishing:\n",
    "    $ lamblayer create --packages packages.json --dry-run",
))]
pub struct Cli {
    /// Named AWS profile to load credentials from.
    #[arg(long, global = true, value_name = "PROFILE")]
    pub profile: Option<String>,

    /// AWS region to publish into [default: from the environment or profile].
    #[arg(long, global = true, value_name = "REGION")]
    pub region: Option<String>,

    /// Log level for progress output.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Publish a new layer version.
    Create(CreateArgs),
}

/// Arguments for the create command.
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Package spec file describing a remotely built dependency bundle.
    #[arg(long, value_name = "PATH")]
    pub packages: Option<PathBuf>,

    /// Source directory to zip into the layer.
    #[arg(long, value_name = "PATH")]
    pub src: Option<PathBuf>,

    /// First wrap directory inside the archive (with --src).
    #[arg(long, value_name = "NAME")]
    pub wrap_dir1: Option<String>,

    /// Second wrap directory inside the archive (with --src).
    #[arg(long, value_name = "NAME")]
    pub wrap_dir2: Option<String>,

    /// Layer config file.
    #[arg(long = "layer", value_name = "PATH", default_value = "layer.json")]
    pub layer_config: PathBuf,

    /// Base URL of the remote package build service.
    #[arg(
        long,
        value_name = "URL",
        env = "LAMBLAYER_BUILD_SERVICE_URL",
        default_value = DEFAULT_BUILD_SERVICE_URL
    )]
    pub build_service_url: Url,

    /// Seconds to wait for a remote package build before giving up.
    #[arg(long, value_name = "SECS", default_value_t = 900)]
    pub poll_timeout: u64,

    /// Show the plan and exit without building or publishing.
    #[arg(long)]
    pub dry_run: bool,
}

impl CreateArgs {
    /// Resolve the layer content source from `--packages` / `--src`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LamblayerError::InvalidOption`] when both or
    /// neither option is given.
    pub fn content_source(&self) -> Result<ContentSource> {
        let wraps = WrapDirs::new(self.wrap_dir1.as_deref(), self.wrap_dir2.as_deref());
        ContentSource::from_options(self.packages.clone(), self.src.clone(), wraps)
    }

    /// Poll policy for remote package builds.
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::with_timeout(Duration::from_secs(self.poll_timeout))
    }
}

impl Cli {
    /// Session options from the global flags.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            profile: self.profile.clone(),
            region: self.region.clone(),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
