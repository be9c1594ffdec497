//! Fingerprint-keyed artifact cache
//!
//! Compiled packages live on disk under the cache root:
//!
//! ```text
//! <root>/<fingerprint>/compiled/...      package output
//! <root>/<fingerprint>/.kiln-compiled    marker, present only for complete entries
//! <root>/.staging/                       in-flight writes
//! ```
//!
//! The marker is the sole source of truth for "already built". Entries are
//! assembled in the staging area and renamed into place, so a reader never
//! sees a marker next to a partially written output.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::model::Fingerprint;
use crate::infra::filesystem;

/// Name of the marker file that completes an entry
pub const COMPILED_MARKER: &str = ".kiln-compiled";

/// Directory holding the package output inside an entry
pub const COMPILED_SUBDIR: &str = "compiled";

/// Directory for in-flight writes under the cache root
pub const STAGING_SUBDIR: &str = ".staging";

/// Storage for compiled package artifacts
pub trait ArtifactCache: Send + Sync {
    /// Whether a complete artifact exists for the fingerprint
    fn exists(&self, fingerprint: &Fingerprint) -> bool;

    /// Copy the artifact's contents into `destination`
    fn materialize(&self, fingerprint: &Fingerprint, destination: &Path) -> io::Result<()>;

    /// Store the contents of `source` as the artifact for the fingerprint
    ///
    /// Returns the location of the stored output. Storing an artifact that
    /// already exists is not an error.
    fn persist(&self, fingerprint: &Fingerprint, source: &Path) -> io::Result<PathBuf>;
}

/// Artifact cache on the local filesystem
#[derive(Debug)]
pub struct FsArtifactCache {
    root: PathBuf,
    staging_seq: AtomicU64,
}

impl FsArtifactCache {
    /// Create a cache rooted at `root`
    ///
    /// The directory is created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging_seq: AtomicU64::new(0),
        }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the entry for a fingerprint
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Directory holding the compiled output for a fingerprint
    pub fn compiled_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.entry_path(fingerprint).join(COMPILED_SUBDIR)
    }

    fn marker_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.entry_path(fingerprint).join(COMPILED_MARKER)
    }

    fn staging_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(STAGING_SUBDIR)
            .join(format!("{fingerprint}-{}-{seq}", std::process::id()))
    }

    /// Fingerprints of all entries under the root, complete or not
    pub fn entries(&self) -> io::Result<Vec<Fingerprint>> {
        let read_dir = match std::fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            entries.push(Fingerprint::new(name));
        }
        entries.sort();
        Ok(entries)
    }

    fn stage(&self, staging: &Path, source: &Path) -> io::Result<()> {
        filesystem::remove_dir_all(staging).map_err(io::Error::other)?;
        filesystem::copy_dir_all(source, &staging.join(COMPILED_SUBDIR))
            .map_err(io::Error::other)?;
        std::fs::write(staging.join(COMPILED_MARKER), b"")
    }
}

impl ArtifactCache for FsArtifactCache {
    fn exists(&self, fingerprint: &Fingerprint) -> bool {
        self.marker_path(fingerprint).is_file()
    }

    fn materialize(&self, fingerprint: &Fingerprint, destination: &Path) -> io::Result<()> {
        if !self.exists(fingerprint) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no compiled artifact for fingerprint {fingerprint}"),
            ));
        }
        filesystem::copy_dir_all(&self.compiled_path(fingerprint), destination)
            .map_err(io::Error::other)
    }

    fn persist(&self, fingerprint: &Fingerprint, source: &Path) -> io::Result<PathBuf> {
        let compiled = self.compiled_path(fingerprint);
        if self.exists(fingerprint) {
            return Ok(compiled);
        }

        let staging = self.staging_path(fingerprint);
        if let Err(e) = self.stage(&staging, source) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let entry = self.entry_path(fingerprint);
        let renamed = std::fs::rename(&staging, &entry).or_else(|first| {
            if self.exists(fingerprint) {
                return Ok(());
            }
            // An entry without a marker is debris from an interrupted run.
            if entry.exists() {
                tracing::warn!("Replacing incomplete cache entry {}", entry.display());
                std::fs::remove_dir_all(&entry)?;
                return std::fs::rename(&staging, &entry);
            }
            Err(first)
        });

        match renamed {
            Ok(()) => {
                let _ = std::fs::remove_dir_all(&staging);
                tracing::debug!("Stored artifact {}", compiled.display());
                Ok(compiled)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }
}
