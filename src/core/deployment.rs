//! Deployment descriptor
//!
//! A deployment descriptor names the roles that will be deployed and the jobs
//! (and optionally extra packages) each role takes from which release:
//!
//! ```toml
//! [[roles]]
//! name = "proxy"
//!
//! [[roles.jobs]]
//! name = "tor"
//! release = "tor"
//! ```
//!
//! Only packages reachable from a resolved descriptor are compiled.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::model::{Package, Release};
use crate::error::{FilterError, ManifestError};

/// Deployment descriptor as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentManifest {
    /// Roles to deploy
    #[serde(default)]
    pub roles: Vec<RoleEntry>,
}

/// A role in the descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct RoleEntry {
    /// Role name
    pub name: String,
    /// Jobs the role runs
    #[serde(default)]
    pub jobs: Vec<ReleaseRef>,
    /// Packages the role needs beyond those of its jobs
    #[serde(default)]
    pub packages: Vec<ReleaseRef>,
}

/// A job or package name qualified by its release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRef {
    /// Job or package name
    pub name: String,
    /// Release providing it
    pub release: String,
}

/// A descriptor resolved against loaded releases
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    roles: Vec<ResolvedRole>,
}

/// A role with its jobs and packages resolved to shared objects
#[derive(Debug, Clone)]
pub struct ResolvedRole {
    /// Role name
    pub name: String,
    /// Packages referenced directly by the role's jobs and package list
    pub packages: Vec<Arc<Package>>,
}

impl DeploymentManifest {
    /// Load a descriptor from a TOML file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Resolve every role against the loaded releases
    pub fn resolve(&self, releases: &[Release]) -> Result<Deployment, FilterError> {
        ensure_unique_releases(releases)?;

        let find_release = |role: &str, name: &str| {
            releases
                .iter()
                .find(|r| r.name == name)
                .ok_or_else(|| FilterError::UnknownRelease {
                    role: role.to_string(),
                    release: name.to_string(),
                })
        };

        let mut roles = Vec::with_capacity(self.roles.len());
        for role in &self.roles {
            let mut packages = Vec::new();

            for job_ref in &role.jobs {
                let release = find_release(&role.name, &job_ref.release)?;
                let job = release
                    .lookup_job(&job_ref.name)
                    .ok_or_else(|| FilterError::UnknownJob {
                        role: role.name.clone(),
                        job: job_ref.name.clone(),
                        release: release.name.clone(),
                    })?;
                packages.extend(job.packages.iter().cloned());
            }

            for pkg_ref in &role.packages {
                let release = find_release(&role.name, &pkg_ref.release)?;
                let pkg = release.lookup_package(&pkg_ref.name).ok_or_else(|| {
                    FilterError::UnknownPackage {
                        role: role.name.clone(),
                        package: pkg_ref.name.clone(),
                        release: release.name.clone(),
                    }
                })?;
                packages.push(Arc::clone(pkg));
            }

            tracing::debug!(
                "Role {} references {} packages directly",
                role.name,
                packages.len()
            );
            roles.push(ResolvedRole {
                name: role.name.clone(),
                packages,
            });
        }

        Ok(Deployment { roles })
    }
}

/// Reject a set of releases in which one name appears twice
pub fn ensure_unique_releases(releases: &[Release]) -> Result<(), FilterError> {
    let mut seen = HashSet::new();
    for release in releases {
        if !seen.insert(release.name.as_str()) {
            return Err(FilterError::DuplicateRelease {
                name: release.name.clone(),
            });
        }
    }
    Ok(())
}

impl Deployment {
    /// Resolved roles, in descriptor order
    pub fn roles(&self) -> &[ResolvedRole] {
        &self.roles
    }

    /// Packages referenced directly by any role, in descriptor order
    pub fn referenced_packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.roles.iter().flat_map(|r| r.packages.iter())
    }
}
