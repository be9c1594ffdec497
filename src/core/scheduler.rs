//! Build scheduler
//!
//! Runs build levels strictly in order. Inside a level, every package gets a
//! task that waits for one of `W` permits before calling the build driver; the
//! level ends when all its tasks have finished. Packages whose dependencies
//! failed are skipped without being attempted, and every failure is collected
//! into one [`CompileError`] at the end of the run.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::buckets::BuildLevels;
use crate::core::driver::{BuildDriver, BuildOutcome};
use crate::core::events::{Boundary, EventSink, PhaseEvent, PHASE_COMPILE, PHASE_RUN, PHASE_WAIT};
use crate::core::model::{Fingerprint, Package, QualifiedName};
use crate::error::{BuildError, CompileError, FailureReason, PackageFailure};

/// Packages that have an artifact after a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Built in this run
    pub built: Vec<QualifiedName>,
    /// Stored by a concurrent run between planning and building
    pub cached: Vec<QualifiedName>,
}

impl CompileReport {
    /// Number of packages that have an artifact
    pub fn total(&self) -> usize {
        self.built.len() + self.cached.len()
    }
}

/// Level-by-level build scheduler with a bounded worker pool
pub struct Scheduler<D> {
    workers: usize,
    driver: Arc<D>,
    sink: Arc<dyn EventSink>,
}

impl<D> Scheduler<D>
where
    D: BuildDriver + 'static,
{
    /// Create a scheduler running at most `workers` builds at once
    ///
    /// A bound of zero is raised to one.
    pub fn new(workers: usize, driver: Arc<D>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            workers: workers.max(1),
            driver,
            sink,
        }
    }

    /// Concurrency bound
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Build every level
    ///
    /// Returns an error listing every failed and skipped package if any
    /// package did not get an artifact; packages that did keep theirs.
    pub async fn run(&self, levels: &BuildLevels) -> Result<CompileReport, CompileError> {
        let mut report = CompileReport::default();
        let mut failures: Vec<PackageFailure> = Vec::new();
        // Failed or skipped packages, mapped to the package that caused it.
        let mut poisoned: HashMap<Fingerprint, QualifiedName> = HashMap::new();

        if levels.is_empty() {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let total = levels.package_count();

        for (index, level) in levels.levels().iter().enumerate() {
            let mut tasks = JoinSet::new();
            let mut in_flight: HashMap<Fingerprint, Arc<Package>> = HashMap::new();

            for pkg in level {
                if let Some(dependency) = blocked_by(pkg, &poisoned).cloned() {
                    tracing::warn!(
                        "Skipping {}: dependency {dependency} failed",
                        pkg.qualified_name()
                    );
                    failures.push(PackageFailure {
                        package: pkg.qualified_name().to_string(),
                        fingerprint: pkg.fingerprint.to_string(),
                        reason: FailureReason::DependencyFailed {
                            dependency: dependency.to_string(),
                        },
                    });
                    poisoned.insert(pkg.fingerprint.clone(), dependency);
                    continue;
                }

                in_flight.insert(pkg.fingerprint.clone(), Arc::clone(pkg));
                tasks.spawn(build_task(
                    Arc::clone(pkg),
                    Arc::clone(&self.driver),
                    Arc::clone(&semaphore),
                    Arc::clone(&self.sink),
                ));
            }

            tracing::debug!(
                "Level {index}: {} packages, {} started",
                level.len(),
                in_flight.len()
            );

            while let Some(joined) = tasks.join_next().await {
                let (pkg, result) = match joined {
                    Ok(finished) => finished,
                    Err(e) => {
                        tracing::error!("Build task ended abnormally: {e}");
                        continue;
                    }
                };
                in_flight.remove(&pkg.fingerprint);

                let name = pkg.qualified_name();
                match result {
                    Ok(BuildOutcome::Built) => report.built.push(name),
                    Ok(BuildOutcome::AlreadyCached) => report.cached.push(name),
                    Err(error) => {
                        match &error {
                            BuildError::NonZeroExit { logs, .. } if !logs.is_empty() => {
                                tracing::error!("{error}\n{logs}");
                            }
                            _ => tracing::error!("{error}"),
                        }
                        failures.push(PackageFailure {
                            package: name.to_string(),
                            fingerprint: pkg.fingerprint.to_string(),
                            reason: FailureReason::Build(error),
                        });
                        poisoned.insert(pkg.fingerprint.clone(), name);
                    }
                }
            }

            // Tasks that never reported back were cancelled.
            for pkg in in_flight.into_values() {
                let name = pkg.qualified_name();
                failures.push(PackageFailure {
                    package: name.to_string(),
                    fingerprint: pkg.fingerprint.to_string(),
                    reason: FailureReason::Build(BuildError::Aborted {
                        package: name.to_string(),
                        error: "build task was cancelled".to_string(),
                    }),
                });
                poisoned.insert(pkg.fingerprint.clone(), name);
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(CompileError::PackagesFailed { total, failures })
        }
    }
}

/// One package's build: wait for a slot, then run the driver
async fn build_task<D>(
    pkg: Arc<Package>,
    driver: Arc<D>,
    semaphore: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
) -> (Arc<Package>, Result<BuildOutcome, BuildError>)
where
    D: BuildDriver + 'static,
{
    let name = pkg.qualified_name();
    let emit = |phase: &'static str, boundary: Boundary| {
        sink.emit(PhaseEvent::now(phase, Some(name.clone()), boundary));
    };

    emit(PHASE_COMPILE, Boundary::Start);
    emit(PHASE_WAIT, Boundary::Start);
    let permit = semaphore.acquire_owned().await;
    emit(PHASE_WAIT, Boundary::Done);

    let result = match permit {
        Ok(_permit) => {
            emit(PHASE_RUN, Boundary::Start);
            let result = AssertUnwindSafe(driver.build(&pkg))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(BuildError::Aborted {
                        package: name.to_string(),
                        error: panic_message(panic.as_ref()),
                    })
                });
            emit(PHASE_RUN, Boundary::Done);
            result
        }
        Err(e) => Err(BuildError::Aborted {
            package: name.to_string(),
            error: e.to_string(),
        }),
    };

    emit(PHASE_COMPILE, Boundary::Done);
    (pkg, result)
}

/// First failed or skipped package among the transitive dependencies
fn blocked_by<'a>(
    pkg: &Package,
    poisoned: &'a HashMap<Fingerprint, QualifiedName>,
) -> Option<&'a QualifiedName> {
    if poisoned.is_empty() {
        return None;
    }

    let mut seen = std::collections::HashSet::new();
    let mut pending: Vec<&Arc<Package>> = pkg.dependencies.iter().collect();
    while let Some(dep) = pending.pop() {
        if !seen.insert(&dep.fingerprint) {
            continue;
        }
        // Skipped packages map to the package that actually failed.
        if let Some(root) = poisoned.get(&dep.fingerprint) {
            return Some(root);
        }
        pending.extend(dep.dependencies.iter());
    }
    None
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
