//! Scratch workspace for one package build
//!
//! ```text
//! <work_dir>/<fingerprint>/
//!   sources/         package sources (directory copy or archive)
//!   dependencies/    compiled artifact of every direct dependency, by name
//!   output/          where the build procedure installs its result
//! ```

use futures::future::try_join_all;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::model::Package;
use crate::error::{BuildError, FilesystemError};
use crate::infra::artifact_cache::ArtifactCache;
use crate::infra::filesystem;

const SOURCES_SUBDIR: &str = "sources";
const DEPENDENCIES_SUBDIR: &str = "dependencies";
const OUTPUT_SUBDIR: &str = "output";

/// Host-side layout of a prepared workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub sources: PathBuf,
    pub dependencies: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    /// Layout for a package, without touching the filesystem
    pub fn layout(work_dir: &Path, package: &Package) -> Self {
        let root = work_dir.join(package.fingerprint.as_str());
        Self {
            sources: root.join(SOURCES_SUBDIR),
            dependencies: root.join(DEPENDENCIES_SUBDIR),
            output: root.join(OUTPUT_SUBDIR),
            root,
        }
    }

    /// Create a fresh workspace with sources and dependency artifacts in place
    ///
    /// Leftovers from an earlier attempt at the same fingerprint are removed
    /// first.
    pub async fn prepare<C>(
        work_dir: &Path,
        package: &Arc<Package>,
        cache: &Arc<C>,
    ) -> Result<Self, BuildError>
    where
        C: ArtifactCache + ?Sized + 'static,
    {
        let workspace = Self::layout(work_dir, package);

        let skeleton = workspace.clone();
        let pkg = Arc::clone(package);
        blocking(package, &workspace.root, move || {
            filesystem::remove_dir_all(&skeleton.root).map_err(|e| e.to_string())?;
            for dir in [&skeleton.sources, &skeleton.dependencies, &skeleton.output] {
                filesystem::create_dir_all(dir).map_err(|e| e.to_string())?;
            }
            stage_sources(&pkg, &skeleton.sources)
        })
        .await?;

        let materializations = package.dependencies.iter().map(|dep| {
            let cache = Arc::clone(cache);
            let fingerprint = dep.fingerprint.clone();
            let destination = workspace.dependencies.join(&dep.name);
            let reported = destination.clone();
            async move {
                blocking(package, &reported, move || {
                    cache
                        .materialize(&fingerprint, &destination)
                        .map_err(|e| format!("dependency artifact {fingerprint}: {e}"))
                })
                .await
            }
        });
        try_join_all(materializations).await?;

        tracing::debug!(
            "Prepared workspace for {} at {}",
            package.qualified_name(),
            workspace.root.display()
        );
        Ok(workspace)
    }

    /// Remove the workspace from disk
    pub fn remove(&self) -> Result<(), FilesystemError> {
        filesystem::remove_dir_all(&self.root)
    }
}

/// Run blocking filesystem work off the async threads
async fn blocking<F>(package: &Package, path: &Path, work: F) -> Result<(), BuildError>
where
    F: FnOnce() -> Result<(), String> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(format!("workspace task failed: {e}")));
    result.map_err(|error| BuildError::Workspace {
        package: package.qualified_name().to_string(),
        path: path.to_path_buf(),
        error,
    })
}

fn stage_sources(package: &Package, sources: &Path) -> Result<(), String> {
    let source = &package.source;
    if source.as_os_str().is_empty() {
        return Ok(());
    }

    if source.is_dir() {
        return filesystem::copy_dir_all(source, sources).map_err(|e| e.to_string());
    }

    if let Some(expected) = &package.sha256 {
        let actual = sha256_file(source)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(format!(
                "checksum mismatch for {}: expected {expected}, got {actual}",
                source.display()
            ));
        }
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| format!("source {} has no file name", source.display()))?;
    filesystem::copy_file(source, &sources.join(file_name)).map_err(|e| e.to_string())
}

fn sha256_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Fingerprint;
    use crate::infra::artifact_cache::FsArtifactCache;
    use assert_fs::prelude::*;

    fn cache_with(temp: &assert_fs::TempDir, fingerprint: &str, file: &str) -> Arc<FsArtifactCache> {
        let cache = Arc::new(FsArtifactCache::new(temp.path().join("cache")));
        let output = temp.child(format!("built-{fingerprint}"));
        output.child(file).write_str(fingerprint).unwrap();
        cache
            .persist(&Fingerprint::new(fingerprint), output.path())
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn test_prepare_stages_sources_and_dependencies() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/tor/configure").write_str("#!/bin/sh").unwrap();
        let cache = cache_with(&temp, "LE", "lib/libevent.so");

        let libevent = Arc::new(Package::new("tor", "libevent", "LE"));
        let tor = Arc::new(
            Package::new("tor", "tor", "TOR")
                .with_source(temp.path().join("src/tor"), None)
                .with_dependencies(vec![libevent]),
        );

        let ws = Workspace::prepare(&temp.path().join("work"), &tor, &cache)
            .await
            .unwrap();

        assert_eq!(ws.root, temp.path().join("work/TOR"));
        temp.child("work/TOR/sources/configure").assert("#!/bin/sh");
        temp.child("work/TOR/dependencies/libevent/lib/libevent.so")
            .assert("LE");
        assert!(ws.output.is_dir());

        ws.remove().unwrap();
        assert!(!ws.root.exists());
    }

    #[tokio::test]
    async fn test_prepare_clears_stale_workspace() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("work/A/output/stale").write_str("old").unwrap();
        let cache = Arc::new(FsArtifactCache::new(temp.path().join("cache")));
        let pkg = Arc::new(Package::new("r", "a", "A"));

        Workspace::prepare(&temp.path().join("work"), &pkg, &cache)
            .await
            .unwrap();
        temp.child("work/A/output/stale")
            .assert(predicates::path::missing());
    }

    #[tokio::test]
    async fn test_prepare_verifies_archive_checksum() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.tgz").write_str("archive").unwrap();
        let cache = Arc::new(FsArtifactCache::new(temp.path().join("cache")));

        let good = sha256_file(temp.child("a.tgz").path()).unwrap();
        let pkg = Arc::new(
            Package::new("r", "a", "A").with_source(temp.path().join("a.tgz"), Some(good)),
        );
        Workspace::prepare(&temp.path().join("work"), &pkg, &cache)
            .await
            .unwrap();
        temp.child("work/A/sources/a.tgz").assert("archive");

        let bad = Arc::new(
            Package::new("r", "b", "B")
                .with_source(temp.path().join("a.tgz"), Some("00".repeat(32))),
        );
        let err = Workspace::prepare(&temp.path().join("work"), &bad, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Workspace { ref error, .. } if error.contains("checksum mismatch")));
    }

    #[tokio::test]
    async fn test_prepare_fails_without_dependency_artifact() {
        let temp = assert_fs::TempDir::new().unwrap();
        let cache = Arc::new(FsArtifactCache::new(temp.path().join("cache")));
        let dep = Arc::new(Package::new("r", "go", "GO"));
        let pkg = Arc::new(Package::new("r", "consul", "C").with_dependencies(vec![dep]));

        let err = Workspace::prepare(&temp.path().join("work"), &pkg, &cache)
            .await
            .unwrap_err();
        match err {
            BuildError::Workspace { package, .. } => assert_eq!(package, "r/consul"),
            other => panic!("Expected workspace error, got {other:?}"),
        }
    }
}
