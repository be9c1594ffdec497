//! Dependency bucket builder
//!
//! Partitions a package set into build levels. A package's level is one more
//! than the deepest of its dependencies (level 0 for packages without any), so
//! every dependency lands in an earlier level and packages in the same level
//! never depend on each other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::core::model::{Fingerprint, Package};
use crate::error::GraphError;

/// Ordered build levels
///
/// Levels are ordered by increasing depth; packages within a level are sorted
/// by name and then fingerprint.
#[derive(Debug, Clone, Default)]
pub struct BuildLevels {
    levels: Vec<Vec<Arc<Package>>>,
}

impl BuildLevels {
    /// Levels in build order
    pub fn levels(&self) -> &[Vec<Arc<Package>>] {
        &self.levels
    }

    /// Number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether there is nothing to build
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Total number of packages across all levels
    pub fn package_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Iterate over every package in build order
    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.levels.iter().flatten()
    }
}

/// Compute build levels for a package set
///
/// Packages sharing a fingerprint are built once; the one with the smallest
/// name represents them. Dependencies outside the set still count towards
/// depth but are not placed in any level, and levels left empty by such gaps
/// are dropped.
pub fn create_dep_buckets(packages: &[Arc<Package>]) -> Result<BuildLevels, GraphError> {
    let mut members: HashMap<Fingerprint, Arc<Package>> = HashMap::new();
    for pkg in packages {
        members
            .entry(pkg.fingerprint.clone())
            .and_modify(|current| {
                if pkg.name < current.name {
                    *current = Arc::clone(pkg);
                }
            })
            .or_insert_with(|| Arc::clone(pkg));
    }

    let mut walker = DepthWalker {
        limit: reachable_count(&members),
        members: &members,
        depths: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
    };

    // Walking in a fixed order keeps reported cycles stable between runs.
    let mut ordered: Vec<&Arc<Package>> = members.values().collect();
    ordered.sort_by(|a, b| (&a.name, &a.fingerprint).cmp(&(&b.name, &b.fingerprint)));

    let mut by_depth: BTreeMap<usize, Vec<Arc<Package>>> = BTreeMap::new();
    for pkg in ordered {
        let depth = walker.depth(pkg)?;
        by_depth.entry(depth).or_default().push(Arc::clone(pkg));
    }

    let levels: Vec<Vec<Arc<Package>>> = by_depth.into_values().collect();

    tracing::debug!(
        "Bucketed {} packages into {} levels",
        members.len(),
        levels.len()
    );

    Ok(BuildLevels { levels })
}

/// Number of distinct fingerprints reachable from the set, dependencies included
fn reachable_count(members: &HashMap<Fingerprint, Arc<Package>>) -> usize {
    let mut seen: HashSet<&Fingerprint> = HashSet::new();
    let mut pending: Vec<&Arc<Package>> = members.values().collect();
    while let Some(pkg) = pending.pop() {
        if seen.insert(&pkg.fingerprint) {
            pending.extend(pkg.dependencies.iter());
        }
    }
    seen.len()
}

struct DepthWalker<'a> {
    members: &'a HashMap<Fingerprint, Arc<Package>>,
    limit: usize,
    depths: HashMap<Fingerprint, usize>,
    stack: Vec<Arc<Package>>,
    on_stack: HashSet<Fingerprint>,
}

impl DepthWalker<'_> {
    fn depth(&mut self, pkg: &Arc<Package>) -> Result<usize, GraphError> {
        // Set members win over the dependency object so edges to a different
        // object with the same fingerprint land on the same node.
        let pkg = self.members.get(&pkg.fingerprint).unwrap_or(pkg);

        if let Some(&depth) = self.depths.get(&pkg.fingerprint) {
            return Ok(depth);
        }

        if self.on_stack.contains(&pkg.fingerprint) {
            let start = self
                .stack
                .iter()
                .position(|p| p.fingerprint == pkg.fingerprint)
                .unwrap_or(0);
            let mut cycle: Vec<String> = self.stack[start..]
                .iter()
                .map(|p| p.name.clone())
                .collect();
            cycle.push(pkg.name.clone());
            return Err(GraphError::CircularDependency { cycle });
        }

        // Unreachable while every revisit is caught above; kept so a broken
        // graph can never recurse past the number of packages it holds.
        if self.stack.len() >= self.limit {
            return Err(GraphError::DepthExceeded {
                package: pkg.name.clone(),
                limit: self.limit,
            });
        }

        self.stack.push(Arc::clone(pkg));
        self.on_stack.insert(pkg.fingerprint.clone());

        let mut depth = 0;
        for dep in &pkg.dependencies {
            depth = depth.max(self.depth(dep)? + 1);
        }

        self.stack.pop();
        self.on_stack.remove(&pkg.fingerprint);
        self.depths.insert(pkg.fingerprint.clone(), depth);
        Ok(depth)
    }
}
