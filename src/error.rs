//! Error types for kiln
//!
//! Domain-specific error types using thiserror. Graph and filter errors are
//! fatal and stop a run before any build starts; build errors are recorded per
//! package and aggregated into a [`CompileError`] at the end of a run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Dependency graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Dependency walk went deeper than the graph has packages
    #[error("Dependency chain of '{package}' is deeper than the {limit} packages in the graph")]
    DepthExceeded { package: String, limit: usize },
}

/// Deployment descriptor errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The same release was loaded twice
    #[error("Release '{name}' has been loaded more than once")]
    DuplicateRelease { name: String },

    /// Role references a release that is not loaded
    #[error("Role '{role}' references release '{release}', which is not loaded")]
    UnknownRelease { role: String, release: String },

    /// Role references a job the release does not define
    #[error("Cannot find job '{job}' in release '{release}' (role '{role}')")]
    UnknownJob {
        role: String,
        job: String,
        release: String,
    },

    /// Role references a package the release does not define
    #[error("Cannot find package '{package}' in release '{release}' (role '{role}')")]
    UnknownPackage {
        role: String,
        package: String,
        release: String,
    },
}

/// Manifest file errors (release manifests and deployment descriptors)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Failed to read manifest
    #[error("Failed to read manifest '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse manifest
    #[error("Failed to parse manifest '{path}': {error}")]
    Parse { path: PathBuf, error: String },
}

/// Release loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    /// Manifest could not be read or parsed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Package name defined twice
    #[error("Release '{release}' defines package '{package}' more than once")]
    DuplicatePackage { release: String, package: String },

    /// Dependency not defined in the release
    #[error("Package '{dependency}' required by '{package}' is not part of release '{release}'")]
    UnknownDependency {
        release: String,
        package: String,
        dependency: String,
    },

    /// Job lists a package not defined in the release
    #[error("Job '{job}' in release '{release}' references unknown package '{package}'")]
    UnknownJobPackage {
        release: String,
        job: String,
        package: String,
    },

    /// Fingerprint is not usable as a single directory name
    #[error("Package '{package}' in release '{release}' has invalid fingerprint '{fingerprint}'")]
    InvalidFingerprint {
        release: String,
        package: String,
        fingerprint: String,
    },

    /// Fingerprint could not be derived from the package source
    #[error("Failed to fingerprint source of '{package}' at '{path}': {error}")]
    Fingerprint {
        package: String,
        path: PathBuf,
        error: String,
    },

    /// Package dependencies form a cycle
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Per-package build errors
///
/// Each variant is a distinct failure kind; all of them mean "this package
/// failed" to the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Scratch workspace could not be prepared
    #[error("Failed to prepare workspace for '{package}' at '{path}': {error}")]
    Workspace {
        package: String,
        path: PathBuf,
        error: String,
    },

    /// Build environment could not be created or driven
    #[error("Failed to launch build environment for '{package}': {error}")]
    ExecutorLaunch { package: String, error: String },

    /// Build procedure exited with a non-zero status
    #[error("Build of '{package}' exited with status {exit_code}")]
    NonZeroExit {
        package: String,
        exit_code: i32,
        logs: String,
    },

    /// Compiled output could not be stored in the artifact cache
    #[error("Failed to persist artifact of '{package}' to '{path}': {error}")]
    Persistence {
        package: String,
        path: PathBuf,
        error: String,
    },

    /// Build task panicked or was cancelled
    #[error("Build task for '{package}' aborted: {error}")]
    Aborted { package: String, error: String },
}

/// Why a package ended a run without an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The package's own build failed
    Build(BuildError),
    /// A (transitive) dependency failed, so the build was never attempted
    DependencyFailed { dependency: String },
}

/// One failed or skipped package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    /// Qualified package name (`release/package`)
    pub package: String,
    /// Package fingerprint
    pub fingerprint: String,
    /// Failure reason
    pub reason: FailureReason,
}

impl PackageFailure {
    /// Whether the package was skipped rather than attempted
    pub fn is_skipped(&self) -> bool {
        matches!(self.reason, FailureReason::DependencyFailed { .. })
    }
}

impl fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FailureReason::Build(error) => {
                write!(f, "{}: failed: {error}", self.package)?;
                if let BuildError::NonZeroExit { logs, .. } = error {
                    for line in logs.lines() {
                        write!(f, "\n      | {line}")?;
                    }
                }
                Ok(())
            }
            FailureReason::DependencyFailed { dependency } => {
                write!(f, "{}: skipped: dependency {dependency} failed", self.package)
            }
        }
    }
}

/// Aggregated outcome of a run that did not fully succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Some packages failed or were skipped
    #[error(
        "{} of {total} packages did not compile:\n{}",
        failures.len(),
        format_failures(failures)
    )]
    PackagesFailed {
        total: usize,
        failures: Vec<PackageFailure>,
    },
}

impl CompileError {
    /// All failed and skipped packages
    pub fn failures(&self) -> &[PackageFailure] {
        match self {
            Self::PackagesFailed { failures, .. } => failures,
        }
    }

    /// Packages whose own build failed
    pub fn failed(&self) -> impl Iterator<Item = &PackageFailure> {
        self.failures().iter().filter(|f| !f.is_skipped())
    }

    /// Packages skipped because a dependency failed
    pub fn skipped(&self) -> impl Iterator<Item = &PackageFailure> {
        self.failures().iter().filter(|f| f.is_skipped())
    }
}

fn format_failures(failures: &[PackageFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to read directory
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },

    /// Failed to copy
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level kiln error type
#[derive(Error, Debug)]
pub enum KilnError {
    /// Graph error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Filter error
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Release error
    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Compile error
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}

impl KilnError {
    /// Whether the error was raised before any build started
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Compile(_))
    }
}
