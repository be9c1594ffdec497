//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;

use commands::{Commands, OutputMode};

/// Kiln - compile release packages inside disposable containers
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let output = OutputMode {
            quiet: self.quiet,
            json: self.json,
        };
        if let Some(cmd) = self.command {
            cmd.run(output).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }

    /// Log level implied by `-q` and `-v`
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }

    /// Log filter for the run
    ///
    /// A non-empty `RUST_LOG` replaces the `-q`/`-v` level entirely.
    pub fn env_filter(&self, rust_log: Option<&str>) -> tracing_subscriber::EnvFilter {
        match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
            Some(directives) => tracing_subscriber::EnvFilter::new(directives),
            None => tracing_subscriber::EnvFilter::default().add_directive(self.log_level().into()),
        }
    }
}
