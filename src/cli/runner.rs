//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::cli::server;
use crate::config::{load_config, BridgeConfig};
use crate::error::{Result, ResultExt};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match self.cli.command {
            Commands::Run => self.run_bridge().await,
            Commands::Validate => self.validate(),
            Commands::Defaults => Self::defaults(),
        }
    }

    /// Whether verbose output was requested
    pub fn verbose(&self) -> bool {
        self.cli.verbose
    }

    /// Load the configuration, falling back to defaults without `-c`
    pub fn load_config(&self) -> Result<BridgeConfig> {
        match &self.cli.config {
            Some(path) => load_config(path),
            None => Ok(BridgeConfig::default()),
        }
    }

    async fn run_bridge(&self) -> Result<()> {
        let config = self.load_config()?;
        let bridge = Arc::new(config.build()?);
        bridge.start()?;

        let shutdown = CancellationToken::new();
        let server = if config.http_server.enabled {
            let listener = tokio::net::TcpListener::bind(&config.http_server.address)
                .await
                .with_context(|| {
                    format!(
                        "Failed to bind status server to {}",
                        config.http_server.address
                    )
                })?;
            Some(tokio::spawn(server::serve(
                listener,
                Arc::clone(&bridge),
                shutdown.clone(),
            )))
        } else {
            None
        };

        tokio::signal::ctrl_c().await?;
        info!("Received interrupt, shutting down");

        let stopped = bridge.stop(config.shutdown_timeout()).await;
        shutdown.cancel();
        if let Some(server) = server {
            match server.await {
                Ok(Err(e)) => warn!(error = %e, "Status server failed"),
                Err(e) => warn!(error = %e, "Status server task failed"),
                Ok(Ok(())) => {}
            }
        }

        stopped.map_err(|e| {
            warn!(error = %e, "Bridge did not shut down cleanly");
            e
        })
    }

    fn validate(&self) -> Result<()> {
        let config = self.load_config()?;
        let bridge = config.build()?;

        println!(
            "{}",
            json!({
                "type": "LOG",
                "log": {
                    "level": "INFO",
                    "message": format!(
                        "Config is valid: {} input, {} processors, {} output ({} connectors)",
                        format!("{:?}", config.input.input_type).to_lowercase(),
                        config.pipeline.processors.len(),
                        format!("{:?}", config.output.output_type).to_lowercase(),
                        bridge.metrics().len()
                    )
                }
            })
        );
        Ok(())
    }

    fn defaults() -> Result<()> {
        print!("{}", BridgeConfig::default().to_yaml()?);
        Ok(())
    }
}
