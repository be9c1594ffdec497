//! Platform-specific directory management
//!
//! Provides platform-specific paths for the artifact cache, build workspaces
//! and configuration. Follows the XDG Base Directory Specification on Linux
//! and standard locations on macOS.
//!
//! Environment variables can override default directories:
//! - `KILN_CACHE_DIR` - Override cache directory
//! - `KILN_CONFIG_DIR` - Override config directory

use std::env;
use std::path::{Path, PathBuf};

use crate::config::defaults::CONFIG_FILE_NAME;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "KILN_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "KILN_CONFIG_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "kiln";

/// Subdirectory names
const COMPILED_SUBDIR: &str = "compiled";
const WORK_SUBDIR: &str = "work";

/// Platform-specific directory provider for kiln
#[derive(Debug, Clone)]
pub struct KilnDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
}

impl KilnDirs {
    /// Create a new `KilnDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: Self::resolve_cache_dir(),
            config_dir: Self::resolve_config_dir(),
        }
    }

    /// Use explicit cache and config roots
    #[must_use]
    pub fn with_roots(cache_dir: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Get the cache directory path
    ///
    /// - Linux: `$XDG_CACHE_HOME/kiln` or `~/.cache/kiln`
    /// - macOS: `~/Library/Caches/kiln`
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/kiln` or `~/.config/kiln`
    /// - macOS: `~/Library/Application Support/kiln`
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Fingerprint-keyed artifact cache, shared across runs
    #[must_use]
    pub fn compiled_dir(&self) -> PathBuf {
        self.cache_dir.join(COMPILED_SUBDIR)
    }

    /// Scratch workspaces for builds in progress
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.cache_dir.join(WORK_SUBDIR)
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    fn resolve_cache_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CACHE_DIR) {
            return PathBuf::from(path);
        }

        dirs::cache_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".cache").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".cache").join(APP_NAME))
            })
    }

    fn resolve_config_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
    }
}

impl Default for KilnDirs {
    fn default() -> Self {
        Self::new()
    }
}
