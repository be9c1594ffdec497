//! Global configuration management
//!
//! Reads settings from `config.toml` in the config directory:
//!
//! ```toml
//! [compile]
//! workers = 8
//! keep_container_on_failure = false
//! base_image = "ubuntu:22.04"
//! runtime = "podman"
//! network = false
//! cache_dir = "/var/cache/kiln/compiled"
//! work_dir = "/var/tmp/kiln"
//! metrics = "/var/log/kiln/metrics.csv"
//! ```
//!
//! Every field is optional. Effective settings are resolved with the priority
//! CLI flags > config file > defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::defaults;
use crate::infra::dirs::KilnDirs;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration for kiln
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Compile settings
    #[serde(default)]
    pub compile: CompileConfig,
}

/// `[compile]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Concurrent builds
    pub workers: Option<usize>,

    /// Keep failed build environments for inspection
    pub keep_container_on_failure: Option<bool>,

    /// Base image for build environments
    pub base_image: Option<String>,

    /// Container runtime (`docker` or `podman`)
    pub runtime: Option<String>,

    /// Allow network access during builds
    pub network: Option<bool>,

    /// Artifact cache directory
    pub cache_dir: Option<PathBuf>,

    /// Workspace directory
    pub work_dir: Option<PathBuf>,

    /// Metrics CSV file
    pub metrics: Option<PathBuf>,
}

impl KilnConfig {
    /// Load configuration from the config directory
    ///
    /// A missing file yields the default configuration.
    pub fn load(dirs: &KilnDirs) -> Result<Self, ConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }
}

/// Compile settings given on the command line
#[derive(Debug, Clone, Default)]
pub struct CompileOverrides {
    pub workers: Option<usize>,
    pub keep_container_on_failure: bool,
    pub base_image: Option<String>,
    pub runtime: Option<String>,
    pub network: bool,
    pub cache_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub metrics: Option<PathBuf>,
}

/// Effective compile settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSettings {
    pub workers: usize,
    pub keep_container_on_failure: bool,
    pub base_image: String,
    /// `None` means detect
    pub runtime: Option<String>,
    pub network: bool,
    pub cache_dir: PathBuf,
    pub work_dir: PathBuf,
    pub metrics: Option<PathBuf>,
}

impl CompileSettings {
    /// Resolve relative directories against `base`
    ///
    /// Workspace paths become container mount sources, which runtimes only
    /// accept as absolute paths.
    #[must_use]
    pub fn absolutize(mut self, base: &Path) -> Self {
        let absolute = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };
        self.cache_dir = absolute(self.cache_dir);
        self.work_dir = absolute(self.work_dir);
        self.metrics = self.metrics.map(absolute);
        self
    }
}

/// Determine compile settings from CLI flags and the config file
///
/// Priority: CLI flags > config file > defaults. Boolean flags can only turn
/// a setting on.
pub fn resolve_compile_settings(
    cli: &CompileOverrides,
    config: &KilnConfig,
    dirs: &KilnDirs,
) -> CompileSettings {
    let file = &config.compile;

    CompileSettings {
        workers: cli
            .workers
            .or(file.workers)
            .unwrap_or(defaults::DEFAULT_WORKERS)
            .max(1),
        keep_container_on_failure: cli.keep_container_on_failure
            || file.keep_container_on_failure.unwrap_or(false),
        base_image: cli
            .base_image
            .clone()
            .or_else(|| file.base_image.clone())
            .unwrap_or_else(|| defaults::DEFAULT_BASE_IMAGE.to_string()),
        runtime: cli.runtime.clone().or_else(|| file.runtime.clone()),
        network: cli.network || file.network.unwrap_or(false),
        cache_dir: cli
            .cache_dir
            .clone()
            .or_else(|| file.cache_dir.clone())
            .unwrap_or_else(|| dirs.compiled_dir()),
        work_dir: cli
            .work_dir
            .clone()
            .or_else(|| file.work_dir.clone())
            .unwrap_or_else(|| dirs.work_dir()),
        metrics: cli.metrics.clone().or_else(|| file.metrics.clone()),
    }
}
