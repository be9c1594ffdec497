//! Configuration and constants
//!
//! - [`defaults`] - Default values used when neither the CLI nor the config file sets one

pub mod defaults;
