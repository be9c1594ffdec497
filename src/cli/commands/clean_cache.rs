//! CLI implementation for `kiln clean-cache`
//!
//! Removes compiled artifacts that none of the given releases reference.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::{load_settings, OutputMode};
use crate::cli::output::status;
use crate::core::clean::{clean_cache, referenced_fingerprints};
use crate::core::config::CompileOverrides;
use crate::core::release::load_releases;
use crate::infra::artifact_cache::FsArtifactCache;

/// Execute the clean-cache command
pub fn execute(releases: &[PathBuf], cache_dir: Option<PathBuf>, output: OutputMode) -> Result<()> {
    let releases = load_releases(releases).context("Failed to load releases")?;
    let settings = load_settings(&CompileOverrides {
        cache_dir,
        ..Default::default()
    })?;
    let cache = FsArtifactCache::new(&settings.cache_dir);

    let result = clean_cache(&cache, &referenced_fingerprints(&releases))
        .with_context(|| format!("Failed to clean {}", settings.cache_dir.display()))?;

    if output.json {
        let removed: Vec<String> = result.removed.iter().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "removed": removed, "kept": result.kept })
        );
    } else if !output.quiet {
        if result.removed.is_empty() {
            println!("{} Nothing to clean", status::SUCCESS);
        } else {
            println!("{} Removed {} cached artifacts:", status::SUCCESS, result.removed.len());
            for fingerprint in &result.removed {
                println!("  {fingerprint}");
            }
        }
    }
    Ok(())
}
