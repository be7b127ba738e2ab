//! Solidafy Bridge CLI
//!
//! Command-line interface for running a bridge

use clap::Parser;
use solidafy_bridge::cli::{Cli, Runner};
use solidafy_bridge::LogLevel;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let runner = Runner::new(cli);

    // Initialize logging
    let level = if runner.verbose() {
        LogLevel::Debug
    } else {
        runner.load_config().map(|c| c.log_level).unwrap_or_default()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .init();

    if let Err(e) = runner.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
