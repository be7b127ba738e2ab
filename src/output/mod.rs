//! Output module
//!
//! Outputs consume a stream of transactions and deliver them to an external
//! sink, writing one response per transaction.
//!
//! # Overview
//!
//! - [`Writer`] - session owner for a concrete sink (AMQP, HTTP)
//! - [`WriterOutput`] - supervisory loop that keeps a writer connected and
//!   feeds it transactions through the [`AckBridge`]
//! - [`Output`] - object-safe interface used by the pipeline wiring

mod amqp;
mod bridge;
mod http;
mod writer;

pub use amqp::{AmqpWriter, AmqpWriterConfig, DEFAULT_AMQP_URL};
pub use bridge::{AckBridge, Delivery};
pub use http::{HttpWriter, HttpWriterConfig, RateLimitConfig};

pub(crate) use amqp::exchange_kind;
pub use writer::{confirmed, PendingConfirm, Writer};

use crate::error::{Error, Result};
use crate::lifecycle::{cancellable, finish_teardown, Lifecycle, Outcome};
use crate::metrics::{ConnectorMetrics, MetricsSnapshot};
use crate::reconnect::{Reconnector, DEFAULT_RECONNECT_INTERVAL};
use crate::transaction::TransactionReceiver;
use crate::types::{ConnectorKind, ConnectorState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A terminal pipeline stage that delivers transactions to a sink
#[async_trait]
pub trait Output: Send + Sync {
    /// Register the transaction stream and start the output
    ///
    /// Fails with [`Error::AlreadyStarted`] on a second call.
    fn start_receiving(&self, transactions: TransactionReceiver) -> Result<()>;

    /// Current connector state
    fn state(&self) -> ConnectorState;

    /// Snapshot of the output's counters
    fn metrics(&self) -> MetricsSnapshot;

    /// Request shutdown without blocking
    fn close_async(&self);

    /// Block until the output has shut down or the timeout elapses
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// Drives a [`Writer`] with a reconnect loop and acknowledgment bridge
pub struct WriterOutput<W: Writer> {
    name: String,
    writer: Arc<W>,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ConnectorMetrics>,
    reconnect_interval: Duration,
    started: AtomicBool,
}

impl<W: Writer> WriterOutput<W> {
    /// Create an output around a writer
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self::from_arc(name, Arc::new(writer))
    }

    /// Create an output around a shared writer
    pub fn from_arc(name: impl Into<String>, writer: Arc<W>) -> Self {
        let name = name.into();
        Self {
            metrics: Arc::new(ConnectorMetrics::for_connector(ConnectorKind::Output, &name)),
            name,
            writer,
            lifecycle: Arc::new(Lifecycle::new()),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            started: AtomicBool::new(false),
        }
    }

    /// Set the interval between connection attempts
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// The wrapped writer
    pub fn writer(&self) -> &Arc<W> {
        &self.writer
    }

    /// Shared counters
    pub fn connector_metrics(&self) -> &Arc<ConnectorMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl<W: Writer> Output for WriterOutput<W> {
    fn start_receiving(&self, transactions: TransactionReceiver) -> Result<()> {
        if !self.lifecycle.is_running() {
            return Err(Error::ShuttingDown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let service = OutputLoop {
            writer: Arc::clone(&self.writer),
            lifecycle: Arc::clone(&self.lifecycle),
            metrics: Arc::clone(&self.metrics),
            reconnector: Reconnector::new(
                format!("output.{}", self.name),
                self.reconnect_interval,
                Arc::clone(&self.lifecycle),
                Arc::clone(&self.metrics),
            ),
        };
        tokio::spawn(service.run(transactions));
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.lifecycle.state()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn close_async(&self) {
        self.lifecycle.close_async();
        // Never started: nothing else will ever confirm the close.
        if !self.started.swap(true, Ordering::AcqRel) {
            drop(self.lifecycle.closed_guard());
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.wait_for_close(timeout).await
    }
}

/// State owned by the spawned supervisory task
struct OutputLoop<W: Writer> {
    writer: Arc<W>,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ConnectorMetrics>,
    reconnector: Reconnector,
}

impl<W: Writer> OutputLoop<W> {
    async fn run(self, transactions: TransactionReceiver) {
        let _closed = self.lifecycle.closed_guard();
        self.metrics.loop_started();

        self.serve(transactions).await;

        finish_teardown(self.reconnector.name(), self.writer.disconnect()).await;
        self.metrics.loop_stopped();
    }

    async fn serve(&self, mut transactions: TransactionReceiver) {
        let token = self.lifecycle.close_token();
        let writer: &W = &self.writer;
        let bridge = AckBridge::new(writer, &self.reconnector, token, &self.metrics);
        let mut lost = false;

        loop {
            if !writer.is_connected() {
                if self
                    .reconnector
                    .connect(lost, move || writer.connect())
                    .await
                    .is_cancelled()
                {
                    return;
                }
                if !lost {
                    info!(connector = %self.reconnector.name(), "Sending messages");
                }
                lost = true;
            }

            let ts = match cancellable(token, transactions.recv()).await {
                Outcome::Cancelled | Outcome::Ready(None) => return,
                Outcome::Ready(Some(ts)) => ts,
            };
            self.metrics.record_message();

            let (payload, sink) = ts.into_parts();
            match bridge.deliver(&payload).await {
                Delivery::Cancelled => return,
                Delivery::Complete(response) => {
                    if !writer.is_connected() {
                        self.lifecycle.set_state(ConnectorState::Disconnected);
                    }
                    if !sink.send(response) {
                        debug!(connector = %self.reconnector.name(), "Originator stopped waiting for response");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
