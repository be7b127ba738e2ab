//! Processor stage
//!
//! Relays transactions through a chain of processors. Every message a
//! processor chain produces is forwarded downstream as its own transaction,
//! in order and one at a time; the upstream transaction gets one combined
//! response once they have all been answered. The first failure wins and
//! stops the remaining messages.

use crate::error::{Error, Result};
use crate::lifecycle::{cancellable, Lifecycle, Outcome};
use crate::message::Message;
use crate::metrics::{ConnectorMetrics, MetricsSnapshot};
use crate::processor::Processor;
use crate::transaction::{
    handoff, Response, Transaction, TransactionReceiver, TransactionSender,
};
use crate::types::{ConnectorKind, ConnectorState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A pipeline stage running a processor chain
pub struct ProcessorStage {
    name: String,
    processors: Arc<[Box<dyn Processor>]>,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ConnectorMetrics>,
    started: AtomicBool,
}

impl ProcessorStage {
    /// Create a stage over the given processors
    pub fn new(name: impl Into<String>, processors: Vec<Box<dyn Processor>>) -> Self {
        let name = name.into();
        Self {
            metrics: Arc::new(ConnectorMetrics::for_connector(ConnectorKind::Pipeline, &name)),
            name,
            processors: processors.into(),
            lifecycle: Arc::new(Lifecycle::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Stage name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of processors in the chain
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the chain has no processors
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Start relaying `upstream` and return the downstream channel
    pub fn start(&self, upstream: TransactionReceiver) -> Result<TransactionReceiver> {
        if !self.lifecycle.is_running() {
            return Err(Error::ShuttingDown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let (tx, rx) = handoff();
        let relay = StageLoop {
            name: format!("pipeline.{}", self.name),
            processors: Arc::clone(&self.processors),
            lifecycle: Arc::clone(&self.lifecycle),
            metrics: Arc::clone(&self.metrics),
        };
        tokio::spawn(relay.run(upstream, tx));
        Ok(rx)
    }

    /// Current state
    pub fn state(&self) -> ConnectorState {
        self.lifecycle.state()
    }

    /// Snapshot of the stage's counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Request shutdown without blocking
    pub fn close_async(&self) {
        self.lifecycle.close_async();
        if !self.started.swap(true, Ordering::AcqRel) {
            drop(self.lifecycle.closed_guard());
        }
    }

    /// Block until the stage has shut down or the timeout elapses
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.wait_for_close(timeout).await
    }
}

/// Run a message through every processor in order
fn apply(processors: &[Box<dyn Processor>], message: Message) -> Result<Vec<Message>> {
    let mut batch = vec![message];
    for processor in processors {
        let mut next = Vec::with_capacity(batch.len());
        for msg in batch {
            next.extend(processor.process(msg)?);
        }
        if next.is_empty() {
            debug!(processor = processor.name(), "Message dropped by processor");
            return Ok(next);
        }
        batch = next;
    }
    Ok(batch)
}

struct StageLoop {
    name: String,
    processors: Arc<[Box<dyn Processor>]>,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ConnectorMetrics>,
}

impl StageLoop {
    async fn run(self, mut upstream: TransactionReceiver, downstream: TransactionSender) {
        let _closed = self.lifecycle.closed_guard();
        self.metrics.loop_started();
        self.lifecycle.set_state(ConnectorState::Connected);
        let token = self.lifecycle.close_token();

        loop {
            let ts = match cancellable(token, upstream.recv()).await {
                Outcome::Cancelled | Outcome::Ready(None) => break,
                Outcome::Ready(Some(ts)) => ts,
            };
            self.metrics.record_message();
            let (payload, sink) = ts.into_parts();

            let response = match apply(&self.processors, payload) {
                Ok(messages) => match forward(token, &downstream, messages).await {
                    Outcome::Cancelled => break,
                    Outcome::Ready(response) => response,
                },
                Err(e) => {
                    debug!(stage = %self.name, error = %e, "Processing failed");
                    Err(e)
                }
            };

            if response.is_ok() {
                self.metrics.record_send_success();
            } else {
                self.metrics.record_send_error();
            }
            sink.send(response);
        }

        self.metrics.loop_stopped();
    }
}

/// Forward messages one at a time, stopping at the first failure
async fn forward(
    token: &CancellationToken,
    downstream: &TransactionSender,
    messages: Vec<Message>,
) -> Outcome<Response> {
    for message in messages {
        let (ts, pending) = Transaction::new(message);
        match cancellable(token, downstream.send(ts)).await {
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Ready(Err(_)) => return Outcome::Ready(Err(Error::ShuttingDown)),
            Outcome::Ready(Ok(())) => {}
        }
        match cancellable(token, pending.recv()).await {
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Ready(Ok(())) => {}
            Outcome::Ready(Err(e)) => return Outcome::Ready(Err(e)),
        }
    }
    Outcome::Ready(Ok(()))
}
