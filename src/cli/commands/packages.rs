//! Packages command implementation
//!
//! Implements `kiln packages` to list the packages a compile would consider.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use super::{load_inputs, load_settings, OutputMode, ReleaseArgs};
use crate::core::config::CompileOverrides;
use crate::core::filter::gather_packages;
use crate::infra::artifact_cache::{ArtifactCache, FsArtifactCache};

#[derive(Serialize)]
struct PackageRow {
    release: String,
    name: String,
    version: String,
    fingerprint: String,
    compiled: bool,
    dependencies: Vec<String>,
}

/// Execute the packages command
pub fn execute(
    inputs: &ReleaseArgs,
    cache_dir: Option<PathBuf>,
    all: bool,
    output: OutputMode,
) -> Result<()> {
    let (releases, deployment) = load_inputs(inputs)?;
    let settings = load_settings(&CompileOverrides {
        cache_dir,
        ..Default::default()
    })?;
    let cache = FsArtifactCache::new(&settings.cache_dir);

    let rows: Vec<PackageRow> = gather_packages(&releases, deployment.as_ref())
        .into_iter()
        .map(|pkg| PackageRow {
            release: pkg.release.clone(),
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            fingerprint: pkg.fingerprint.to_string(),
            compiled: cache.exists(&pkg.fingerprint),
            dependencies: pkg.dependencies.iter().map(|d| d.name.clone()).collect(),
        })
        .filter(|row| all || !row.compiled)
        .collect();

    if output.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let marker = if row.compiled { " [compiled]" } else { "" };
        println!(
            "{}/{} {} {}{marker}",
            row.release, row.name, row.version, row.fingerprint
        );
    }
    Ok(())
}
