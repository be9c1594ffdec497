//! Package graph model
//!
//! Releases own their packages and jobs. Packages are immutable once loaded and
//! shared through `Arc`, so dependency edges are plain references and graph
//! walks never go through a name lookup.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Content-derived package identity
///
/// Two packages with the same fingerprint produce interchangeable artifacts,
/// even when they come from different releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Create a fingerprint from its string form
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the fingerprint as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `release/package` name used in logs, events and error reports
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    /// Owning release name
    pub release: String,
    /// Package name
    pub package: String,
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.release, self.package)
    }
}

/// A versioned package belonging to a release
#[derive(Debug, Clone)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Package version
    pub version: String,
    /// Content fingerprint
    pub fingerprint: Fingerprint,
    /// Owning release name
    pub release: String,
    /// Source archive or directory
    pub source: PathBuf,
    /// Expected SHA256 of the source archive
    pub sha256: Option<String>,
    /// Build procedure run inside the executor (defaults to the `packaging` script)
    pub packaging: Option<String>,
    /// Direct dependencies
    pub dependencies: Vec<Arc<Package>>,
}

impl Package {
    /// Create a package with no version, source or dependencies
    pub fn new(
        release: impl Into<String>,
        name: impl Into<String>,
        fingerprint: impl Into<Fingerprint>,
    ) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            fingerprint: fingerprint.into(),
            release: release.into(),
            source: PathBuf::new(),
            sha256: None,
            packaging: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the source location
    #[must_use]
    pub fn with_source(mut self, source: impl Into<PathBuf>, sha256: Option<String>) -> Self {
        self.source = source.into();
        self.sha256 = sha256;
        self
    }

    /// Set the build procedure
    #[must_use]
    pub fn with_packaging(mut self, packaging: impl Into<String>) -> Self {
        self.packaging = Some(packaging.into());
        self
    }

    /// Set the direct dependencies
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Arc<Package>>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// `release/name`
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            release: self.release.clone(),
            package: self.name.clone(),
        }
    }
}

/// A job and the packages it needs at runtime
#[derive(Debug, Clone)]
pub struct Job {
    /// Job name
    pub name: String,
    /// Owning release name
    pub release: String,
    /// Packages the job references
    pub packages: Vec<Arc<Package>>,
}

/// A named, versioned collection of packages and jobs
#[derive(Debug, Clone, Default)]
pub struct Release {
    /// Release name
    pub name: String,
    /// Release version
    pub version: String,
    /// Packages, in manifest order
    pub packages: Vec<Arc<Package>>,
    /// Jobs, in manifest order
    pub jobs: Vec<Job>,
}

impl Release {
    /// Create an empty release
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            packages: Vec::new(),
            jobs: Vec::new(),
        }
    }

    /// Find a package by name
    pub fn lookup_package(&self, name: &str) -> Option<&Arc<Package>> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Find a job by name
    pub fn lookup_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }
}
