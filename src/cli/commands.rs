//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solidafy Bridge CLI
#[derive(Parser, Debug)]
#[command(name = "solidafy-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bridge configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the bridge until interrupted
    Run,

    /// Validate the configuration without connecting
    Validate,

    /// Print the default configuration as YAML
    Defaults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["solidafy-bridge", "-c", "bridge.yaml", "run", "-v"]);
        assert_eq!(cli.command, Commands::Run);
        assert_eq!(cli.config, Some(PathBuf::from("bridge.yaml")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_defaults_without_config() {
        let cli = Cli::parse_from(["solidafy-bridge", "defaults"]);
        assert_eq!(cli.command, Commands::Defaults);
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }
}
