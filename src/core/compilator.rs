//! Compile orchestration
//!
//! Ties the pipeline together: gather the packages a run needs, drop those
//! already compiled, level the rest and hand the levels to the scheduler.

use std::sync::Arc;

use crate::core::buckets::{create_dep_buckets, BuildLevels};
use crate::core::deployment::Deployment;
use crate::core::driver::BuildDriver;
use crate::core::events::{Boundary, EventSink, PhaseEvent, PHASE_COMPILE};
use crate::core::filter::{gather_packages, remove_compiled_packages};
use crate::core::model::Release;
use crate::core::scheduler::{CompileReport, Scheduler};
use crate::error::{GraphError, KilnError};
use crate::infra::artifact_cache::ArtifactCache;

/// Package compilation orchestrator
pub struct Compilator<D, C: ?Sized> {
    scheduler: Scheduler<D>,
    cache: Arc<C>,
    sink: Arc<dyn EventSink>,
}

impl<D, C> Compilator<D, C>
where
    D: BuildDriver + 'static,
    C: ArtifactCache + ?Sized,
{
    pub fn new(driver: Arc<D>, cache: Arc<C>, sink: Arc<dyn EventSink>, workers: usize) -> Self {
        Self {
            scheduler: Scheduler::new(workers, driver, Arc::clone(&sink)),
            cache,
            sink,
        }
    }

    /// Levels a compile would build, without building anything
    pub fn plan(
        &self,
        releases: &[Release],
        deployment: Option<&Deployment>,
    ) -> Result<BuildLevels, GraphError> {
        let gathered = gather_packages(releases, deployment);
        let pending = remove_compiled_packages(gathered, self.cache.as_ref());
        create_dep_buckets(&pending)
    }

    /// Build planned levels
    pub async fn execute(&self, levels: &BuildLevels) -> Result<CompileReport, KilnError> {
        tracing::info!(
            "Compiling {} packages in {} levels with {} workers",
            levels.package_count(),
            levels.len(),
            self.scheduler.workers()
        );

        self.sink
            .emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Start));
        let result = self.scheduler.run(levels).await;
        self.sink
            .emit(PhaseEvent::now(PHASE_COMPILE, None, Boundary::Done));

        Ok(result?)
    }

    /// Compile every package the releases (or the deployment) need
    ///
    /// Graph errors are returned before any build starts.
    pub async fn compile(
        &self,
        releases: &[Release],
        deployment: Option<&Deployment>,
    ) -> Result<CompileReport, KilnError> {
        let levels = self.plan(releases, deployment)?;
        self.execute(&levels).await
    }
}
