//! Input to output wiring

use super::ProcessorStage;
use crate::error::Result;
use crate::input::Input;
use crate::metrics::MetricsSnapshot;
use crate::output::Output;
use crate::types::ConnectorState;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A running input, its processor stages and an output
pub struct Bridge {
    input: Box<dyn Input>,
    stages: Vec<ProcessorStage>,
    output: Box<dyn Output>,
}

impl Bridge {
    /// Assemble a bridge; nothing runs until [`Bridge::start`]
    pub fn new(input: Box<dyn Input>, stages: Vec<ProcessorStage>, output: Box<dyn Output>) -> Self {
        Self {
            input,
            stages,
            output,
        }
    }

    /// Connect the transaction channels and start every component
    pub fn start(&self) -> Result<()> {
        let mut transactions = self.input.transaction_chan()?;
        for stage in &self.stages {
            transactions = stage.start(transactions)?;
        }
        self.output.start_receiving(transactions)?;
        info!(stages = self.stages.len(), "Bridge started");
        Ok(())
    }

    /// Request shutdown of every component without blocking
    ///
    /// Transactions in flight are abandoned without an acknowledgment at
    /// their source.
    pub fn close_async(&self) {
        self.input.abort();
        for stage in &self.stages {
            stage.close_async();
        }
        self.output.close_async();
    }

    /// Block until every component has shut down, within one deadline
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        self.input.wait_for_close(remaining()).await?;
        for stage in &self.stages {
            stage.wait_for_close(remaining()).await?;
        }
        self.output.wait_for_close(remaining()).await
    }

    /// Shut down front to back, letting in-flight transactions finish
    ///
    /// The input stops reading first but still acknowledges the transaction
    /// it already handed off; later components exit once their upstream
    /// channel drains. Whatever is still running when the deadline passes
    /// is closed forcibly.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let remaining = || deadline.saturating_duration_since(Instant::now());

        self.input.close_async();
        let drained = async {
            self.input.wait_for_close(remaining()).await?;
            for stage in &self.stages {
                stage.wait_for_close(remaining()).await?;
            }
            self.output.wait_for_close(remaining()).await
        };
        if let Err(e) = drained.await {
            warn!(error = %e, "Graceful shutdown incomplete, closing remaining components");
            self.close_async();
            return Err(e);
        }
        Ok(())
    }

    /// Counters for every component, input first
    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        let mut snapshots = Vec::with_capacity(self.stages.len() + 2);
        snapshots.push(self.input.metrics());
        snapshots.extend(self.stages.iter().map(ProcessorStage::metrics));
        snapshots.push(self.output.metrics());
        snapshots
    }

    /// Input state
    pub fn input_state(&self) -> ConnectorState {
        self.input.state()
    }

    /// Output state
    pub fn output_state(&self) -> ConnectorState {
        self.output.state()
    }

    /// Whether the output holds a live session
    pub fn is_ready(&self) -> bool {
        self.output_state() == ConnectorState::Connected
    }
}
