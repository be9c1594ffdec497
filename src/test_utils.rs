//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;
    use std::sync::Arc;

    use crate::core::model::Package;

    /// Generate a valid package name (lowercase alphanumeric with hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a valid SHA256 hash (64 hex characters)
    pub fn sha256_hash() -> impl Strategy<Value = String> {
        "[0-9a-f]{64}"
    }

    /// Generate the edge list of a random DAG with `1..=max_nodes` nodes
    ///
    /// Node `i` may only depend on nodes with a lower index, so the graph is
    /// acyclic by construction. Each entry is the dependency list of one node.
    pub fn dag_edges(max_nodes: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1..=max_nodes).prop_flat_map(|n| {
            (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(Vec::new()).boxed()
                    } else {
                        proptest::collection::vec(0..i, 0..=i.min(3))
                            .prop_map(|mut deps| {
                                deps.sort_unstable();
                                deps.dedup();
                                deps
                            })
                            .boxed()
                    }
                })
                .collect::<Vec<_>>()
        })
    }

    /// Build shared packages from an edge list produced by [`dag_edges`]
    ///
    /// Package `i` is named `pkg-<i>` with fingerprint `fp-<i>`.
    pub fn packages_from_edges(release: &str, edges: &[Vec<usize>]) -> Vec<Arc<Package>> {
        let mut packages: Vec<Arc<Package>> = Vec::with_capacity(edges.len());
        for (i, deps) in edges.iter().enumerate() {
            let dependencies = deps.iter().map(|&d| Arc::clone(&packages[d])).collect();
            packages.push(Arc::new(
                Package::new(release, format!("pkg-{i}"), format!("fp-{i}"))
                    .with_dependencies(dependencies),
            ));
        }
        packages
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_sha256_hash_generator(hash in sha256_hash()) {
            prop_assert_eq!(hash.len(), 64);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn test_dag_edges_point_backwards(edges in dag_edges(12)) {
            for (i, deps) in edges.iter().enumerate() {
                prop_assert!(deps.iter().all(|&d| d < i));
            }
        }
    }
}
