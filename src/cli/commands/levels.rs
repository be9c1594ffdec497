//! Levels command implementation
//!
//! Implements `kiln levels` to show the build order without building.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use super::{load_inputs, load_settings, OutputMode, ReleaseArgs};
use crate::cli::output::status;
use crate::core::buckets::{create_dep_buckets, BuildLevels};
use crate::core::config::CompileOverrides;
use crate::core::deployment::Deployment;
use crate::core::filter::{gather_packages, remove_compiled_packages};
use crate::core::model::Release;
use crate::infra::artifact_cache::FsArtifactCache;

#[derive(Serialize)]
struct LevelEntry {
    package: String,
    fingerprint: String,
}

/// Execute the levels command
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

    let levels = plan_levels(&releases, deployment.as_ref(), &cache, all)?;
    print_levels(&levels, output);
    Ok(())
}

/// Level the packages of a run, leaving out compiled ones unless `all`
pub(crate) fn plan_levels(
    releases: &[Release],
    deployment: Option<&Deployment>,
    cache: &FsArtifactCache,
    all: bool,
) -> Result<BuildLevels> {
    let mut packages = gather_packages(releases, deployment);
    if !all {
        packages = remove_compiled_packages(packages, cache);
    }
    Ok(create_dep_buckets(&packages)?)
}

/// Print levels as text or JSON
pub(crate) fn print_levels(levels: &BuildLevels, output: OutputMode) {
    if output.json {
        let entries: Vec<Vec<LevelEntry>> = levels
            .levels()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|p| LevelEntry {
                        package: p.qualified_name().to_string(),
                        fingerprint: p.fingerprint.to_string(),
                    })
                    .collect()
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }

    if levels.is_empty() {
        if !output.quiet {
            println!("{} Nothing to compile", status::SUCCESS);
        }
        return;
    }

    for (index, level) in levels.levels().iter().enumerate() {
        println!("Level {index}:");
        for pkg in level {
            println!("  {} ({})", pkg.qualified_name(), pkg.fingerprint);
        }
    }
    if !output.quiet {
        println!(
            "{} {} packages in {} levels",
            status::INFO,
            levels.package_count(),
            levels.len()
        );
    }
}
