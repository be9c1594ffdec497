//! Kiln - compile release packages inside disposable containers
//!
//! This library takes the packages of one or more releases, works out a safe
//! build order, builds them with bounded parallelism in throwaway build
//! environments and stores the results in a fingerprint-keyed artifact cache.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Orchestration logic (leveling, filtering, scheduling, building)
//! - [`infra`] - Infrastructure layer (containers, filesystem, metrics)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
