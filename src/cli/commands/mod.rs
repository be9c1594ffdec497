//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod clean_cache;
pub mod compile;
pub mod jobs;
pub mod levels;
pub mod packages;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::core::config::{resolve_compile_settings, CompileOverrides, CompileSettings, KilnConfig};
use crate::core::deployment::{ensure_unique_releases, Deployment, DeploymentManifest};
use crate::core::model::Release;
use crate::core::release::load_releases;
use crate::infra::dirs::KilnDirs;

/// Release inputs shared by every command
#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    /// Release manifest (repeatable)
    #[arg(short, long = "release", value_name = "MANIFEST", required = true)]
    pub releases: Vec<PathBuf>,

    /// Deployment descriptor restricting the packages to those it references
    #[arg(short, long, value_name = "DESCRIPTOR")]
    pub deployment: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile packages into the artifact cache
    Compile {
        #[command(flatten)]
        inputs: ReleaseArgs,

        /// Maximum number of concurrent builds
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Keep failed build containers and workspaces for inspection
        #[arg(long)]
        keep_container_on_failure: bool,

        /// Base image for build containers
        #[arg(long)]
        base_image: Option<String>,

        /// Container runtime (docker or podman)
        #[arg(long)]
        runtime: Option<String>,

        /// Allow network access during builds
        #[arg(long)]
        network: bool,

        /// Artifact cache directory
        #[arg(long, env = "KILN_COMPILED_DIR")]
        cache_dir: Option<PathBuf>,

        /// Directory for build workspaces
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Append phase timings to this CSV file
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// Show the build levels without building
        #[arg(long)]
        dry_run: bool,
    },

    /// List the packages a compile would consider
    Packages {
        #[command(flatten)]
        inputs: ReleaseArgs,

        /// Artifact cache directory
        #[arg(long, env = "KILN_COMPILED_DIR")]
        cache_dir: Option<PathBuf>,

        /// Include packages that are already compiled
        #[arg(long)]
        all: bool,
    },

    /// List each release's jobs and the packages they use
    Jobs {
        /// Release manifest (repeatable)
        #[arg(short, long = "release", value_name = "MANIFEST", required = true)]
        releases: Vec<PathBuf>,
    },

    /// Show the build levels of the packages still to compile
    Levels {
        #[command(flatten)]
        inputs: ReleaseArgs,

        /// Artifact cache directory
        #[arg(long, env = "KILN_COMPILED_DIR")]
        cache_dir: Option<PathBuf>,

        /// Level every package, compiled or not
        #[arg(long)]
        all: bool,
    },

    /// Remove cached artifacts no loaded release references
    CleanCache {
        /// Release manifests whose packages are kept (repeatable)
        #[arg(short, long = "release", value_name = "MANIFEST", required = true)]
        releases: Vec<PathBuf>,

        /// Artifact cache directory
        #[arg(long, env = "KILN_COMPILED_DIR")]
        cache_dir: Option<PathBuf>,
    },
}

/// Global output switches
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub quiet: bool,
    pub json: bool,
}

impl Commands {
    /// Execute the command
    pub async fn run(self, output: OutputMode) -> Result<()> {
        match self {
            Self::Compile {
                inputs,
                workers,
                keep_container_on_failure,
                base_image,
                runtime,
                network,
                cache_dir,
                work_dir,
                metrics,
                dry_run,
            } => {
                let overrides = CompileOverrides {
                    workers,
                    keep_container_on_failure,
                    base_image,
                    runtime,
                    network,
                    cache_dir,
                    work_dir,
                    metrics,
                };
                compile::execute(&inputs, &overrides, dry_run, output).await
            }
            Self::Packages {
                inputs,
                cache_dir,
                all,
            } => packages::execute(&inputs, cache_dir, all, output),
            Self::Jobs { releases } => jobs::execute(&releases, output),
            Self::Levels {
                inputs,
                cache_dir,
                all,
            } => levels::execute(&inputs, cache_dir, all, output),
            Self::CleanCache {
                releases,
                cache_dir,
            } => clean_cache::execute(&releases, cache_dir, output),
        }
    }
}

/// Load the releases and resolve the deployment descriptor, if any
pub(crate) fn load_inputs(inputs: &ReleaseArgs) -> Result<(Vec<Release>, Option<Deployment>)> {
    let releases = load_releases(&inputs.releases).context("Failed to load releases")?;
    ensure_unique_releases(&releases)?;

    let deployment = match &inputs.deployment {
        Some(path) => {
            let manifest = DeploymentManifest::load(path)?;
            Some(
                manifest
                    .resolve(&releases)
                    .with_context(|| format!("Invalid deployment '{}'", path.display()))?,
            )
        }
        None => None,
    };

    tracing::info!(
        "Loaded {} releases{}",
        releases.len(),
        if deployment.is_some() {
            " with a deployment"
        } else {
            ""
        }
    );
    Ok((releases, deployment))
}

/// Resolve compile settings from the global config and CLI overrides
pub(crate) fn load_settings(overrides: &CompileOverrides) -> Result<CompileSettings> {
    let dirs = KilnDirs::new();
    let config = KilnConfig::load(&dirs)?;
    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    Ok(resolve_compile_settings(overrides, &config, &dirs).absolutize(&cwd))
}
