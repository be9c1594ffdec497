//! Package build driver
//!
//! Turns one package into a cached artifact: prepare a workspace, run the
//! package's build procedure in a disposable environment, persist the output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::defaults::{
    CONTAINER_NAME_PREFIX, DEFAULT_BASE_IMAGE, DEFAULT_PACKAGING_SCRIPT, FAILED_LOG_TAIL_LINES,
};
use crate::core::model::{Fingerprint, Package};
use crate::core::workspace::Workspace;
use crate::error::BuildError;
use crate::infra::artifact_cache::ArtifactCache;
use crate::infra::executor::{
    BuildExecutor, BuildInvocation, EnvironmentHandle, EnvironmentSpec, MountConfig,
};

/// Package sources inside the environment
pub const CONTAINER_SOURCE_DIR: &str = "/kiln/source";
/// Dependency artifacts inside the environment
pub const CONTAINER_DEPENDENCIES_DIR: &str = "/kiln/dependencies";
/// Install target inside the environment
pub const CONTAINER_OUTPUT_DIR: &str = "/kiln/output";

/// How a package ended up with an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Built in this run
    Built,
    /// Another run had already stored the artifact
    AlreadyCached,
}

/// Builds a single package
pub trait BuildDriver: Send + Sync {
    /// Produce the artifact for `package` or fail
    fn build(
        &self,
        package: &Arc<Package>,
    ) -> impl Future<Output = Result<BuildOutcome, BuildError>> + Send;
}

/// Settings for [`ContainerBuildDriver`]
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Parent directory of per-package workspaces
    pub work_dir: PathBuf,
    /// Base image for build environments
    pub base_image: String,
    /// Allow network access during builds
    pub network_enabled: bool,
    /// Leave the environment and workspace behind when a build fails
    pub keep_on_failure: bool,
    /// Parallelism hint passed to build procedures as `KILN_JOBS`
    pub jobs: usize,
}

impl DriverOptions {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            network_enabled: false,
            keep_on_failure: false,
            jobs: num_cpus::get(),
        }
    }
}

/// Driver running builds in executor environments and storing results in a cache
#[derive(Debug)]
pub struct ContainerBuildDriver<E, C: ?Sized> {
    executor: E,
    cache: Arc<C>,
    options: DriverOptions,
    sequence: AtomicU64,
}

impl<E, C> ContainerBuildDriver<E, C>
where
    E: BuildExecutor,
    C: ArtifactCache + ?Sized + 'static,
{
    pub fn new(executor: E, cache: Arc<C>, options: DriverOptions) -> Self {
        Self {
            executor,
            cache,
            options,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Environment name unique to this process and build
    fn environment_name(&self, package: &Package) -> String {
        let short: String = package.fingerprint.as_str().chars().take(12).collect();
        let name: String = package
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!(
            "{CONTAINER_NAME_PREFIX}-{name}-{short}-{}-{}",
            std::process::id(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Environment description for a package's build
    pub fn environment_spec(&self, package: &Package, workspace: &Workspace) -> EnvironmentSpec {
        EnvironmentSpec::new(self.environment_name(package))
            .with_image(&self.options.base_image)
            .with_network(self.options.network_enabled)
            .with_mount(MountConfig::read_write(&workspace.sources, CONTAINER_SOURCE_DIR))
            .with_mount(MountConfig::read_only(
                &workspace.dependencies,
                CONTAINER_DEPENDENCIES_DIR,
            ))
            .with_mount(MountConfig::read_write(&workspace.output, CONTAINER_OUTPUT_DIR))
            .with_workdir(CONTAINER_SOURCE_DIR)
            .with_env("KILN_PACKAGE_NAME", &package.name)
            .with_env("KILN_PACKAGE_VERSION", &package.version)
            .with_env("KILN_FINGERPRINT", package.fingerprint.as_str())
            .with_env("KILN_SOURCE_DIR", CONTAINER_SOURCE_DIR)
            .with_env("KILN_DEPENDENCIES_DIR", CONTAINER_DEPENDENCIES_DIR)
            .with_env("KILN_INSTALL_TARGET", CONTAINER_OUTPUT_DIR)
            .with_env("KILN_JOBS", self.options.jobs.to_string())
    }

    async fn is_cached(&self, fingerprint: &Fingerprint) -> bool {
        let cache = Arc::clone(&self.cache);
        let fingerprint = fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.exists(&fingerprint))
            .await
            .unwrap_or(false)
    }

    async fn persist(&self, package: &Package, output: &Path) -> Result<PathBuf, BuildError> {
        let cache = Arc::clone(&self.cache);
        let fingerprint = package.fingerprint.clone();
        let source = output.to_path_buf();
        let persistence_error = |error: String| BuildError::Persistence {
            package: package.qualified_name().to_string(),
            path: output.to_path_buf(),
            error,
        };

        tokio::task::spawn_blocking(move || cache.persist(&fingerprint, &source))
            .await
            .map_err(|e| persistence_error(e.to_string()))?
            .map_err(|e| persistence_error(e.to_string()))
    }

    async fn destroy(&self, handle: &EnvironmentHandle) {
        if let Err(e) = self.executor.destroy_environment(handle).await {
            tracing::warn!("Failed to remove build environment {}: {e}", handle.id);
        }
    }

    /// Run the build procedure and persist its output
    async fn execute(&self, package: &Package, workspace: &Workspace) -> Result<(), BuildError> {
        let name = package.qualified_name().to_string();
        let spec = self.environment_spec(package, workspace);

        let handle = match self.executor.create_environment(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                // `run -d` can leave a created-but-stopped container behind.
                if !self.options.keep_on_failure {
                    let _ = self
                        .executor
                        .destroy_environment(&EnvironmentHandle {
                            id: spec.name.clone(),
                        })
                        .await;
                }
                return Err(BuildError::ExecutorLaunch {
                    package: name,
                    error: e.to_string(),
                });
            }
        };

        let invocation = BuildInvocation {
            script: package
                .packaging
                .clone()
                .unwrap_or_else(|| DEFAULT_PACKAGING_SCRIPT.to_string()),
        };

        tracing::info!("Compiling {name} in {}", handle.id);
        let result = match self.executor.run_build(&handle, &invocation).await {
            Ok(execution) if execution.success() => Ok(()),
            Ok(execution) => Err(BuildError::NonZeroExit {
                package: name.clone(),
                exit_code: execution.exit_code,
                logs: log_tail(&execution.logs, FAILED_LOG_TAIL_LINES),
            }),
            Err(e) => Err(BuildError::ExecutorLaunch {
                package: name.clone(),
                error: e.to_string(),
            }),
        };

        if result.is_ok() || !self.options.keep_on_failure {
            self.destroy(&handle).await;
        } else {
            tracing::warn!(
                "Keeping build environment {} of {name} for inspection",
                handle.id
            );
        }
        result?;

        let stored = self.persist(package, &workspace.output).await?;
        tracing::debug!("Stored {name} at {}", stored.display());
        Ok(())
    }
}

impl<E, C> BuildDriver for ContainerBuildDriver<E, C>
where
    E: BuildExecutor,
    C: ArtifactCache + ?Sized + 'static,
{
    async fn build(&self, package: &Arc<Package>) -> Result<BuildOutcome, BuildError> {
        let name = package.qualified_name();

        if self.is_cached(&package.fingerprint).await {
            tracing::info!("{name} was compiled by another run");
            return Ok(BuildOutcome::AlreadyCached);
        }

        let workspace = match Workspace::prepare(&self.options.work_dir, package, &self.cache).await
        {
            Ok(workspace) => workspace,
            Err(e) => {
                if !self.options.keep_on_failure {
                    let _ = Workspace::layout(&self.options.work_dir, package).remove();
                }
                return Err(e);
            }
        };

        let result = self.execute(package, &workspace).await;

        if result.is_err() && self.options.keep_on_failure {
            tracing::warn!(
                "Keeping workspace of {name} at {}",
                workspace.root.display()
            );
        } else if let Err(e) = workspace.remove() {
            tracing::warn!("Failed to clean workspace of {name}: {e}");
        }

        result.map(|()| BuildOutcome::Built)
    }
}

/// Last `lines` lines of a build log
fn log_tail(logs: &str, lines: usize) -> String {
    let all: Vec<&str> = logs.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
