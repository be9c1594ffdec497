//! Default configuration values

/// Default number of concurrent builds when neither the CLI nor the config sets one
pub const DEFAULT_WORKERS: usize = 4;

/// Base image for build environments
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:22.04";

/// Build procedure used when a package does not declare one
pub const DEFAULT_PACKAGING_SCRIPT: &str = "sh /kiln/source/packaging";

/// Container name prefix for build environments
pub const CONTAINER_NAME_PREFIX: &str = "kiln-build";

/// Number of trailing log lines kept in a non-zero exit error
pub const FAILED_LOG_TAIL_LINES: usize = 50;

/// Global config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
