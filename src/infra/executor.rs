//! Disposable build environments using Docker/Podman containers
//!
//! Each package build gets its own container, created from a fixed base image
//! with the workspace bound in, driven through `exec`, and removed afterwards.
//! The lifecycle is explicit (create, run, destroy) so callers decide when an
//! environment goes away.

use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

use crate::config::defaults::DEFAULT_BASE_IMAGE;

/// Executor errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Neither Docker nor Podman is installed
    #[error("Neither Docker nor Podman found in PATH")]
    RuntimeNotFound,

    /// Configured runtime is not supported
    #[error("Unknown container runtime '{name}' (expected 'docker' or 'podman')")]
    UnknownRuntime { name: String },

    /// Runtime binary could not be started
    #[error("Failed to run '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Runtime command exited with an error
    #[error("'{command}' failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// Parse a runtime name from configuration
    pub fn from_name(name: &str) -> Result<Self, ExecutorError> {
        match name.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(ExecutorError::UnknownRuntime {
                name: name.to_string(),
            }),
        }
    }

    /// Detect an installed runtime, Docker first
    pub fn detect() -> Option<Self> {
        [Self::Docker, Self::Podman]
            .into_iter()
            .find(|runtime| which::which(runtime.command()).is_ok())
    }
}

/// Mount configuration for container volumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Host path to mount
    pub host_path: PathBuf,
    /// Container path to mount to
    pub container_path: PathBuf,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    /// Create a new read-only mount
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: true,
        }
    }

    /// Create a new read-write mount
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    fn to_arg(&self) -> String {
        let suffix = if self.read_only { ":ro" } else { "" };
        format!(
            "-v={}:{}{suffix}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

/// Everything needed to create one build environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Environment (container) name, unique per build
    pub name: String,
    /// Base image
    pub image: String,
    /// Whether network access is allowed
    pub network_enabled: bool,
    /// Volume mounts
    pub mounts: Vec<MountConfig>,
    /// Working directory inside the environment
    pub workdir: PathBuf,
    /// Environment variables
    pub env: Vec<(String, String)>,
}

impl EnvironmentSpec {
    /// Create a spec with the default base image and no network
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: DEFAULT_BASE_IMAGE.to_string(),
            network_enabled: false,
            mounts: Vec::new(),
            workdir: PathBuf::from("/"),
            env: Vec::new(),
        }
    }

    /// Set the base image
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Allow or deny network access
    #[must_use]
    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    /// Add a mount configuration
    #[must_use]
    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Handle to a created environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Runtime identifier (container name)
    pub id: String,
}

/// A build procedure to run inside an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInvocation {
    /// Shell script passed to `sh -c`
    pub script: String,
}

/// Exit status and captured output of a build procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub logs: String,
}

impl ExecutionResult {
    /// Whether the procedure exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Isolated, disposable environments for running build procedures
pub trait BuildExecutor: Send + Sync {
    /// Create and start an environment
    fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> impl Future<Output = Result<EnvironmentHandle, ExecutorError>> + Send;

    /// Run a build procedure in an environment
    ///
    /// A non-zero exit is reported through [`ExecutionResult`], not as an error.
    fn run_build(
        &self,
        handle: &EnvironmentHandle,
        invocation: &BuildInvocation,
    ) -> impl Future<Output = Result<ExecutionResult, ExecutorError>> + Send;

    /// Stop and remove an environment
    fn destroy_environment(
        &self,
        handle: &EnvironmentHandle,
    ) -> impl Future<Output = Result<(), ExecutorError>> + Send;
}

/// Executor backed by a Docker or Podman runtime
#[derive(Debug, Clone)]
pub struct ContainerExecutor {
    runtime: ContainerRuntime,
}

impl ContainerExecutor {
    /// Create an executor for a runtime
    pub fn new(runtime: ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Create an executor for the configured runtime, or detect one
    pub fn from_config(runtime: Option<&str>) -> Result<Self, ExecutorError> {
        let runtime = match runtime {
            Some(name) => ContainerRuntime::from_name(name)?,
            None => ContainerRuntime::detect().ok_or(ExecutorError::RuntimeNotFound)?,
        };
        tracing::debug!("Using container runtime {}", runtime.command());
        Ok(Self::new(runtime))
    }

    /// Get the runtime
    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Arguments starting a long-lived container for a spec
    pub fn create_args(spec: &EnvironmentSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            format!("--name={}", spec.name),
        ];

        if !spec.network_enabled {
            args.push("--network=none".to_string());
        }

        args.extend(spec.mounts.iter().map(MountConfig::to_arg));
        args.push(format!("-w={}", spec.workdir.display()));

        for (key, value) in &spec.env {
            args.push(format!("-e={key}={value}"));
        }

        args.push(spec.image.clone());
        args.push("sleep".to_string());
        args.push("infinity".to_string());
        args
    }

    /// Arguments running a build procedure in a container
    pub fn exec_args(handle: &EnvironmentHandle, invocation: &BuildInvocation) -> Vec<String> {
        vec![
            "exec".to_string(),
            handle.id.clone(),
            "sh".to_string(),
            "-c".to_string(),
            invocation.script.clone(),
        ]
    }

    /// Arguments removing a container, running or not
    pub fn destroy_args(handle: &EnvironmentHandle) -> Vec<String> {
        vec!["rm".to_string(), "-f".to_string(), handle.id.clone()]
    }

    async fn invoke(&self, args: &[String]) -> Result<std::process::Output, ExecutorError> {
        let command = format!(
            "{} {}",
            self.runtime.command(),
            args.first().map_or("", String::as_str)
        );
        Command::new(self.runtime.command())
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| ExecutorError::Spawn {
                command,
                error: e.to_string(),
            })
    }

    async fn invoke_checked(&self, args: &[String]) -> Result<std::process::Output, ExecutorError> {
        let output = self.invoke(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        Err(ExecutorError::CommandFailed {
            command: format!("{} {}", self.runtime.command(), args.join(" ")),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl BuildExecutor for ContainerExecutor {
    async fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<EnvironmentHandle, ExecutorError> {
        tracing::debug!("Creating container {} from {}", spec.name, spec.image);
        self.invoke_checked(&Self::create_args(spec)).await?;
        Ok(EnvironmentHandle {
            id: spec.name.clone(),
        })
    }

    async fn run_build(
        &self,
        handle: &EnvironmentHandle,
        invocation: &BuildInvocation,
    ) -> Result<ExecutionResult, ExecutorError> {
        let output = self.invoke(&Self::exec_args(handle, invocation)).await?;

        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            logs,
        })
    }

    async fn destroy_environment(&self, handle: &EnvironmentHandle) -> Result<(), ExecutorError> {
        tracing::debug!("Removing container {}", handle.id);
        self.invoke_checked(&Self::destroy_args(handle)).await?;
        Ok(())
    }
}
