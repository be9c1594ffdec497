//! Compile command implementation
//!
//! Implements `kiln compile`: plan the packages a run needs, build them in
//! containers and report what failed.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::{load_inputs, load_settings, OutputMode, ReleaseArgs};
use crate::cli::output::{create_build_bar, status, ProgressSink};
use crate::core::compilator::Compilator;
use crate::core::config::CompileOverrides;
use crate::core::driver::{ContainerBuildDriver, DriverOptions};
use crate::core::events::{EventSink, FanoutSink, TracingSink};
use crate::error::KilnError;
use crate::infra::artifact_cache::FsArtifactCache;
use crate::infra::executor::ContainerExecutor;
use crate::infra::metrics;

/// Execute the compile command
pub async fn execute(
    inputs: &ReleaseArgs,
    overrides: &CompileOverrides,
    dry_run: bool,
    output: OutputMode,
) -> Result<()> {
    let (releases, deployment) = load_inputs(inputs)?;
    let settings = load_settings(overrides)?;
    tracing::debug!("Compile settings: {settings:?}");

    let cache = Arc::new(FsArtifactCache::new(&settings.cache_dir));

    if dry_run {
        let levels = super::levels::plan_levels(&releases, deployment.as_ref(), &cache, false)?;
        super::levels::print_levels(&levels, output);
        return Ok(());
    }

    let executor = ContainerExecutor::from_config(settings.runtime.as_deref())
        .context("No usable container runtime")?;

    let mut options = DriverOptions::new(&settings.work_dir);
    options.base_image.clone_from(&settings.base_image);
    options.network_enabled = settings.network;
    options.keep_on_failure = settings.keep_container_on_failure;
    let driver = Arc::new(ContainerBuildDriver::new(
        executor,
        Arc::clone(&cache),
        options,
    ));

    let bar = if output.quiet || output.json {
        indicatif::ProgressBar::hidden()
    } else {
        create_build_bar(0)
    };
    let mut sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(ProgressSink::new(bar.clone())));

    let metrics_writer = match &settings.metrics {
        Some(path) => {
            let (metrics_sink, writer) = metrics::open(path)
                .await
                .with_context(|| format!("Failed to open metrics file {}", path.display()))?;
            sink = sink.with(Arc::new(metrics_sink));
            Some(writer)
        }
        None => None,
    };

    let compilator = Compilator::new(
        driver,
        cache,
        Arc::new(sink) as Arc<dyn EventSink>,
        settings.workers,
    );

    let result = match compilator.plan(&releases, deployment.as_ref()) {
        Ok(levels) => {
            bar.set_length(levels.package_count() as u64);
            compilator.execute(&levels).await
        }
        Err(e) => Err(KilnError::from(e)),
    };
    bar.finish_and_clear();

    // The writer drains only after every sink handle is gone.
    drop(compilator);
    if let Some(writer) = metrics_writer {
        writer.finish().await;
    }

    let report = result?;
    if output.json {
        let built: Vec<String> = report.built.iter().map(ToString::to_string).collect();
        let cached: Vec<String> = report.cached.iter().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "built": built, "already_cached": cached })
        );
    } else if !output.quiet {
        if report.total() == 0 {
            println!("{} Nothing to compile", status::SUCCESS);
        } else {
            println!(
                "{} Compiled {} packages ({} stored by another run)",
                status::SUCCESS,
                report.built.len(),
                report.cached.len()
            );
        }
    }
    Ok(())
}
