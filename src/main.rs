//! Kiln CLI - compile release packages inside disposable containers
//!
//! Entry point for the kiln command-line application.

use anyhow::Result;
use clap::Parser;

use kiln::cli::output::display_error;
use kiln::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG, when set, replaces -v/-q
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(cli.env_filter(rust_log.as_deref()))
        .init();

    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
