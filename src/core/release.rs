//! Release manifest loading
//!
//! A release is described by a TOML manifest:
//!
//! ```toml
//! [release]
//! name = "tor"
//! version = "0.3.5"
//!
//! [[packages]]
//! name = "libevent"
//! version = "2.1.12"
//! fingerprint = "c1a4..."
//! source = "packages/libevent.tgz"
//! sha256 = "e3b0..."
//!
//! [[packages]]
//! name = "tor"
//! source = "packages/tor"
//! dependencies = ["libevent"]
//!
//! [[jobs]]
//! name = "tor"
//! packages = ["tor"]
//! ```
//!
//! Relative sources resolve against the manifest directory. A missing
//! fingerprint is derived from the package content.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::core::model::{Fingerprint, Job, Package, Release};
use crate::error::{GraphError, ManifestError, ReleaseError};

#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    release: ReleaseHeader,
    #[serde(default)]
    packages: Vec<PackageEntry>,
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct ReleaseHeader {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: String,
    #[serde(default)]
    version: String,
    fingerprint: Option<String>,
    source: PathBuf,
    sha256: Option<String>,
    packaging: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    name: String,
    #[serde(default)]
    packages: Vec<String>,
}

/// Load a release from a manifest file
pub fn load_release(path: &Path) -> Result<Release, ReleaseError> {
    let content = fs::read_to_string(path).map_err(|e| ManifestError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_release(&content, base_dir, path)
}

/// Load several releases, preserving order
pub fn load_releases(paths: &[PathBuf]) -> Result<Vec<Release>, ReleaseError> {
    paths.iter().map(|p| load_release(p)).collect()
}

/// Parse a release manifest
///
/// `origin` is only used in error messages.
pub fn parse_release(
    content: &str,
    base_dir: &Path,
    origin: &Path,
) -> Result<Release, ReleaseError> {
    let manifest: ReleaseManifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
        path: origin.to_path_buf(),
        error: e.to_string(),
    })?;

    let release_name = manifest.release.name.clone();
    let mut index = HashMap::new();
    for (i, entry) in manifest.packages.iter().enumerate() {
        if index.insert(entry.name.as_str(), i).is_some() {
            return Err(ReleaseError::DuplicatePackage {
                release: release_name,
                package: entry.name.clone(),
            });
        }
    }

    let mut resolver = Resolver {
        release: &release_name,
        base_dir,
        entries: &manifest.packages,
        index: &index,
        built: vec![None; manifest.packages.len()],
        stack: Vec::new(),
    };
    for i in 0..manifest.packages.len() {
        resolver.resolve(i)?;
    }
    let packages: Vec<Arc<Package>> = resolver.built.into_iter().flatten().collect();

    let mut jobs = Vec::with_capacity(manifest.jobs.len());
    for job in &manifest.jobs {
        let mut job_packages = Vec::with_capacity(job.packages.len());
        for name in &job.packages {
            let pkg = index
                .get(name.as_str())
                .map(|&i| Arc::clone(&packages[i]))
                .ok_or_else(|| ReleaseError::UnknownJobPackage {
                    release: release_name.clone(),
                    job: job.name.clone(),
                    package: name.clone(),
                })?;
            job_packages.push(pkg);
        }
        jobs.push(Job {
            name: job.name.clone(),
            release: release_name.clone(),
            packages: job_packages,
        });
    }

    tracing::debug!(
        "Loaded release {} ({} packages, {} jobs)",
        release_name,
        packages.len(),
        jobs.len()
    );

    Ok(Release {
        name: release_name,
        version: manifest.release.version,
        packages,
        jobs,
    })
}

/// Builds `Arc<Package>` values dependencies-first
struct Resolver<'a> {
    release: &'a str,
    base_dir: &'a Path,
    entries: &'a [PackageEntry],
    index: &'a HashMap<&'a str, usize>,
    built: Vec<Option<Arc<Package>>>,
    stack: Vec<usize>,
}

impl Resolver<'_> {
    fn resolve(&mut self, i: usize) -> Result<Arc<Package>, ReleaseError> {
        if let Some(pkg) = &self.built[i] {
            return Ok(Arc::clone(pkg));
        }

        if let Some(pos) = self.stack.iter().position(|&s| s == i) {
            let mut cycle: Vec<String> = self.stack[pos..]
                .iter()
                .map(|&s| self.entries[s].name.clone())
                .collect();
            cycle.push(self.entries[i].name.clone());
            return Err(GraphError::CircularDependency { cycle }.into());
        }

        self.stack.push(i);
        let entry = &self.entries[i];
        let mut dependencies = Vec::with_capacity(entry.dependencies.len());
        for dep in &entry.dependencies {
            let &dep_index =
                self.index
                    .get(dep.as_str())
                    .ok_or_else(|| ReleaseError::UnknownDependency {
                        release: self.release.to_string(),
                        package: entry.name.clone(),
                        dependency: dep.clone(),
                    })?;
            dependencies.push(self.resolve(dep_index)?);
        }
        self.stack.pop();

        let source = if entry.source.is_absolute() {
            entry.source.clone()
        } else {
            self.base_dir.join(&entry.source)
        };

        let fingerprint = match &entry.fingerprint {
            Some(fp) if is_valid_fingerprint(fp) => Fingerprint::new(fp.clone()),
            Some(fp) => {
                return Err(ReleaseError::InvalidFingerprint {
                    release: self.release.to_string(),
                    package: entry.name.clone(),
                    fingerprint: fp.clone(),
                })
            }
            None => derive_fingerprint(entry, &source, &dependencies)?,
        };

        let mut pkg = Package::new(self.release, &entry.name, fingerprint)
            .with_version(&entry.version)
            .with_source(source, entry.sha256.clone())
            .with_dependencies(dependencies);
        if let Some(packaging) = &entry.packaging {
            pkg = pkg.with_packaging(packaging);
        }

        let pkg = Arc::new(pkg);
        self.built[i] = Some(Arc::clone(&pkg));
        Ok(pkg)
    }
}

/// Whether a fingerprint names exactly one directory below a root
///
/// Fingerprints are joined onto the work and cache roots, which get cleared
/// recursively, so `..`, separators and absolute paths must never get through.
fn is_valid_fingerprint(fingerprint: &str) -> bool {
    !fingerprint.is_empty()
        && fingerprint != "."
        && fingerprint != ".."
        && !fingerprint.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        && !Path::new(fingerprint).is_absolute()
}

/// Derive a fingerprint from name, version, source content and dependency fingerprints
fn derive_fingerprint(
    entry: &PackageEntry,
    source: &Path,
    dependencies: &[Arc<Package>],
) -> Result<Fingerprint, ReleaseError> {
    let fingerprint_error = |error: String| ReleaseError::Fingerprint {
        package: entry.name.clone(),
        path: source.to_path_buf(),
        error,
    };

    let mut hasher = Sha256::new();
    hasher.update(entry.name.as_bytes());
    hasher.update(b"\0");
    hasher.update(entry.version.as_bytes());
    hasher.update(b"\0");

    if source.is_dir() {
        let mut files = Vec::new();
        for item in WalkDir::new(source).sort_by_file_name() {
            let item = item.map_err(|e| fingerprint_error(e.to_string()))?;
            if item.file_type().is_file() {
                files.push(item.into_path());
            }
        }
        for file in files {
            let relative = file.strip_prefix(source).unwrap_or(&file);
            let content = fs::read(&file).map_err(|e| fingerprint_error(e.to_string()))?;
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            hasher.update(&content);
        }
    } else {
        let content = fs::read(source).map_err(|e| fingerprint_error(e.to_string()))?;
        hasher.update(&content);
    }

    let mut dep_fingerprints: Vec<&str> = dependencies
        .iter()
        .map(|d| d.fingerprint.as_str())
        .collect();
    dep_fingerprints.sort_unstable();
    for fp in dep_fingerprints {
        hasher.update(b"\0");
        hasher.update(fp.as_bytes());
    }

    Ok(Fingerprint::new(hex::encode(hasher.finalize())))
}
