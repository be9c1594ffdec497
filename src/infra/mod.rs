//! Infrastructure layer
//!
//! Handles I/O: container runtimes, the artifact cache on disk, directories
//! and the metrics file.

pub mod artifact_cache;
pub mod dirs;
pub mod executor;
pub mod filesystem;
pub mod metrics;
