//! Package filter
//!
//! Narrows the packages of all loaded releases down to the work set of a run.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::deployment::Deployment;
use crate::core::model::{Fingerprint, Package, Release};
use crate::infra::artifact_cache::ArtifactCache;

/// Collect the packages a run has to consider
///
/// Without a deployment every package of every release is returned. With one,
/// only packages reachable from its roles are returned, dependencies included.
/// Releases are visited in order and packages in release order; the first
/// package seen for a fingerprint wins.
pub fn gather_packages(releases: &[Release], deployment: Option<&Deployment>) -> Vec<Arc<Package>> {
    let mut seen: HashSet<Fingerprint> = HashSet::new();
    let mut gathered = Vec::new();

    match deployment {
        None => {
            for pkg in releases.iter().flat_map(|r| r.packages.iter()) {
                if seen.insert(pkg.fingerprint.clone()) {
                    gathered.push(Arc::clone(pkg));
                }
            }
        }
        Some(deployment) => {
            let mut reachable: HashSet<Fingerprint> = HashSet::new();
            let mut pending: Vec<&Arc<Package>> = deployment.referenced_packages().collect();
            while let Some(pkg) = pending.pop() {
                if reachable.insert(pkg.fingerprint.clone()) {
                    pending.extend(pkg.dependencies.iter());
                }
            }

            for pkg in releases.iter().flat_map(|r| r.packages.iter()) {
                if reachable.contains(&pkg.fingerprint) && seen.insert(pkg.fingerprint.clone()) {
                    gathered.push(Arc::clone(pkg));
                }
            }
        }
    }

    tracing::debug!("Gathered {} packages", gathered.len());
    gathered
}

/// Drop packages whose own artifact is already in the cache
///
/// Dependency edges of the remaining packages still point at the dropped
/// ones, so leveling stays correct.
pub fn remove_compiled_packages<C>(packages: Vec<Arc<Package>>, cache: &C) -> Vec<Arc<Package>>
where
    C: ArtifactCache + ?Sized,
{
    let before = packages.len();
    let remaining: Vec<Arc<Package>> = packages
        .into_iter()
        .filter(|pkg| {
            let cached = cache.exists(&pkg.fingerprint);
            if cached {
                tracing::debug!("{} already compiled", pkg.qualified_name());
            }
            !cached
        })
        .collect();

    tracing::info!(
        "{} of {} packages already compiled",
        before - remaining.len(),
        before
    );
    remaining
}
