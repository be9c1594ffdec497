//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use kiln::core::driver::{BuildDriver, BuildOutcome, CONTAINER_OUTPUT_DIR};
use kiln::core::model::{Job, Package, Release};
use kiln::error::BuildError;
use kiln::infra::executor::{
    BuildExecutor, BuildInvocation, EnvironmentHandle, EnvironmentSpec, ExecutionResult,
    ExecutorError,
};

/// Test project context
///
/// Creates a temporary directory for release manifests, sources and caches.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Artifact cache directory of the project
    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Workspace directory of the project
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Write a release manifest with one source directory per package
    ///
    /// Like [`gen_release`], every package also gets a job of the same name.
    ///
    /// `specs` uses the `name>dep1,dep2` notation of [`gen_release`].
    pub fn write_release(&self, release: &str, specs: &[&str]) -> PathBuf {
        let mut manifest = format!("[release]\nname = \"{release}\"\nversion = \"1\"\n");
        for (name, deps) in parse_specs(specs) {
            self.create_file(
                &format!("{release}/src/{name}/packaging"),
                &format!("echo building {name}\n"),
            );
            let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
            manifest.push_str(&format!(
                "\n[[packages]]\nname = \"{name}\"\nversion = \"1.0\"\nfingerprint = \"{}\"\nsource = \"src/{name}\"\ndependencies = [{}]\n",
                fingerprint_of(release, &name),
                deps.join(", ")
            ));
        }
        for (name, _) in parse_specs(specs) {
            manifest.push_str(&format!(
                "\n[[jobs]]\nname = \"{name}\"\npackages = [\"{name}\"]\n"
            ));
        }
        self.create_file(&format!("{release}/release.toml"), &manifest)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint used for generated packages
pub fn fingerprint_of(release: &str, name: &str) -> String {
    format!("{release}-{name}-fp")
}

/// Parse `name>dep1,dep2` specs, keeping declaration order
fn parse_specs(specs: &[&str]) -> Vec<(String, Vec<String>)> {
    specs
        .iter()
        .map(|spec| match spec.split_once('>') {
            Some((name, deps)) => (
                name.to_string(),
                deps.split(',').map(ToString::to_string).collect(),
            ),
            None => ((*spec).to_string(), Vec::new()),
        })
        .collect()
}

/// Build an in-memory release from `name>dep1,dep2` specs
///
/// Every dependency must be declared as a spec of its own. Each package also
/// gets a job of the same name.
pub fn gen_release(release: &str, specs: &[&str]) -> Release {
    let parsed: BTreeMap<String, Vec<String>> = parse_specs(specs).into_iter().collect();
    let mut built: HashMap<String, Arc<Package>> = HashMap::new();

    fn build(
        release: &str,
        name: &str,
        parsed: &BTreeMap<String, Vec<String>>,
        built: &mut HashMap<String, Arc<Package>>,
    ) -> Arc<Package> {
        if let Some(pkg) = built.get(name) {
            return Arc::clone(pkg);
        }
        let deps = parsed
            .get(name)
            .unwrap_or_else(|| panic!("{name} is not declared"))
            .iter()
            .map(|d| build(release, d, parsed, built))
            .collect();
        let pkg = Arc::new(
            Package::new(release, name, fingerprint_of(release, name))
                .with_version("1.0")
                .with_dependencies(deps),
        );
        built.insert(name.to_string(), Arc::clone(&pkg));
        pkg
    }

    let mut out = Release::new(release, "1");
    for (name, _) in parse_specs(specs) {
        let pkg = build(release, &name, &parsed, &mut built);
        out.jobs.push(Job {
            name: name.clone(),
            release: release.to_string(),
            packages: vec![Arc::clone(&pkg)],
        });
        out.packages.push(pkg);
    }
    out
}

/// Build driver that records calls and fails on demand
#[derive(Default)]
pub struct RecordingDriver {
    started: Mutex<Vec<String>>,
    /// Package names that fail
    pub failing: HashSet<String>,
    /// Time each build takes
    pub delay: Duration,
    running: AtomicUsize,
    /// Highest number of builds seen running at once
    pub max_running: AtomicUsize,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Package names in the order builds started
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl BuildDriver for RecordingDriver {
    async fn build(&self, package: &Arc<Package>) -> Result<BuildOutcome, BuildError> {
        self.started.lock().unwrap().push(package.name.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&package.name) {
            return Err(BuildError::NonZeroExit {
                package: package.qualified_name().to_string(),
                exit_code: 2,
                logs: "make: *** [all] Error 2".to_string(),
            });
        }
        Ok(BuildOutcome::Built)
    }
}

/// Executor that "builds" by writing a file into the output mount
///
/// Packages whose name is in `failing` exit with status 1.
#[derive(Default)]
pub struct FakeExecutor {
    environments: Mutex<HashMap<String, EnvironmentSpec>>,
    runs: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    /// Package names that fail
    pub failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failing = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Package names run, in order
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    /// Environment ids destroyed
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

fn env_value<'a>(spec: &'a EnvironmentSpec, key: &str) -> &'a str {
    spec.env
        .iter()
        .find(|(k, _)| k == key)
        .map_or("", |(_, v)| v.as_str())
}

fn output_mount(spec: &EnvironmentSpec) -> &Path {
    &spec
        .mounts
        .iter()
        .find(|m| m.container_path == Path::new(CONTAINER_OUTPUT_DIR))
        .expect("output mount")
        .host_path
}

impl BuildExecutor for FakeExecutor {
    async fn create_environment(
        &self,
        spec: &EnvironmentSpec,
    ) -> Result<EnvironmentHandle, ExecutorError> {
        self.environments
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        Ok(EnvironmentHandle {
            id: spec.name.clone(),
        })
    }

    async fn run_build(
        &self,
        handle: &EnvironmentHandle,
        _invocation: &BuildInvocation,
    ) -> Result<ExecutionResult, ExecutorError> {
        let spec = self.environments.lock().unwrap()[&handle.id].clone();
        let name = env_value(&spec, "KILN_PACKAGE_NAME").to_string();
        self.runs.lock().unwrap().push(name.clone());

        if self.failing.contains(&name) {
            return Ok(ExecutionResult {
                exit_code: 1,
                logs: format!("building {name}\nerror: {name} failed"),
            });
        }

        std::fs::write(output_mount(&spec).join(format!("{name}.out")), &name)
            .expect("write output");
        Ok(ExecutionResult {
            exit_code: 0,
            logs: format!("building {name}"),
        })
    }

    async fn destroy_environment(&self, handle: &EnvironmentHandle) -> Result<(), ExecutorError> {
        self.destroyed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }
}
