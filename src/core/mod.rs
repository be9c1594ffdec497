//! Core business logic module
//!
//! Everything that decides *what* gets compiled and in which order lives
//! here. Process, container and filesystem plumbing lives in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`model`] - Packages, jobs and releases
//! - [`release`] - Release manifest loading
//! - [`deployment`] - Deployment descriptors
//! - [`filter`] - Narrowing releases down to the packages a run builds
//! - [`buckets`] - Leveling packages into build order
//! - [`scheduler`] - Level-by-level bounded-parallel builds
//! - [`driver`] - Building one package in a disposable environment
//! - [`workspace`] - Per-build scratch directories
//! - [`events`] - Phase events
//! - [`compilator`] - The whole compile pipeline
//! - [`config`] - Global configuration
//! - [`clean`] - Artifact cache cleanup

pub mod buckets;
pub mod clean;
pub mod compilator;
pub mod config;
pub mod deployment;
pub mod driver;
pub mod events;
pub mod filter;
pub mod model;
pub mod release;
pub mod scheduler;
pub mod workspace;
