//! Clean logic
//!
//! Removes artifact cache entries that no loaded release references anymore.

use std::collections::HashSet;

use crate::core::model::{Fingerprint, Release};
use crate::error::FilesystemError;
use crate::infra::artifact_cache::FsArtifactCache;
use crate::infra::filesystem;

/// Result of a cache clean
#[derive(Debug, Default)]
pub struct CleanResult {
    /// Fingerprints whose entries were removed
    pub removed: Vec<Fingerprint>,
    /// Number of entries still referenced
    pub kept: usize,
}

/// Fingerprints of every package in the releases
pub fn referenced_fingerprints(releases: &[Release]) -> HashSet<Fingerprint> {
    releases
        .iter()
        .flat_map(|r| r.packages.iter())
        .map(|p| p.fingerprint.clone())
        .collect()
}

/// Remove cache entries whose fingerprint is not referenced
///
/// The staging area is left alone; it may belong to a run in progress.
pub fn clean_cache(
    cache: &FsArtifactCache,
    referenced: &HashSet<Fingerprint>,
) -> Result<CleanResult, FilesystemError> {
    let mut result = CleanResult::default();

    let entries = cache.entries().map_err(|e| FilesystemError::ReadDir {
        path: cache.root().to_path_buf(),
        error: e.to_string(),
    })?;

    for fingerprint in entries {
        if referenced.contains(&fingerprint) {
            result.kept += 1;
            continue;
        }
        tracing::debug!("Removing unreferenced artifact {fingerprint}");
        filesystem::remove_dir_all(&cache.entry_path(&fingerprint))?;
        result.removed.push(fingerprint);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Package;
    use crate::infra::artifact_cache::ArtifactCache;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(cache: &FsArtifactCache, temp: &TempDir, fingerprint: &str) {
        let output = temp.path().join(format!("out-{fingerprint}"));
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("file"), fingerprint).unwrap();
        cache.persist(&Fingerprint::new(fingerprint), &output).unwrap();
    }

    #[test]
    fn test_clean_removes_only_unreferenced_entries() {
        let temp = TempDir::new().unwrap();
        let cache = FsArtifactCache::new(temp.path().join("cache"));
        store(&cache, &temp, "keep");
        store(&cache, &temp, "drop");

        let mut release = Release::new("r", "1");
        release.packages.push(Arc::new(Package::new("r", "a", "keep")));

        let result = clean_cache(&cache, &referenced_fingerprints(&[release])).unwrap();

        assert_eq!(result.removed, vec![Fingerprint::new("drop")]);
        assert_eq!(result.kept, 1);
        assert!(cache.exists(&Fingerprint::new("keep")));
        assert!(!cache.entry_path(&Fingerprint::new("drop")).exists());
    }

    #[test]
    fn test_clean_missing_cache_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache = FsArtifactCache::new(temp.path().join("nope"));
        let result = clean_cache(&cache, &HashSet::new()).unwrap();
        assert!(result.removed.is_empty());
        assert_eq!(result.kept, 0);
    }
}
