//! Input module
//!
//! Inputs read messages from an external source and push them downstream as
//! transactions, one at a time. The response written to each transaction is
//! passed back to the source through [`Reader::acknowledge`].
//!
//! # Overview
//!
//! - [`Reader`] - session owner for a concrete source (websocket, AMQP)
//! - [`ReaderInput`] - supervisory loop that keeps a reader connected and
//!   hands its messages off with backpressure
//! - [`Input`] - object-safe interface used by the pipeline wiring

mod amqp;
mod websocket;

pub use amqp::{AmqpReader, AmqpReaderConfig};
pub use websocket::{WebsocketReader, WebsocketReaderConfig};

use crate::error::{Error, Result};
use crate::lifecycle::{cancellable, finish_teardown, sleep_or_cancel, Lifecycle, Outcome, Teardown};
use crate::message::Message;
use crate::metrics::{ConnectorMetrics, MetricsSnapshot};
use crate::reconnect::{Reconnector, DEFAULT_RECONNECT_INTERVAL};
use crate::transaction::{handoff, Response, Transaction, TransactionReceiver, TransactionSender};
use crate::types::{ConnectorKind, ConnectorState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Session owner for an input source
#[async_trait]
pub trait Reader: Send + Sync + 'static {
    /// Establish the session
    ///
    /// Returns immediately when already connected. Never retries on failure.
    async fn connect(&self) -> Result<()>;

    /// Read the next message
    ///
    /// Fails with [`Error::NotConnected`] without a session. A broken
    /// session is dropped before returning `NotConnected`, so the caller
    /// reconnects instead of reading stale data.
    async fn read(&self) -> Result<Message>;

    /// Report the downstream outcome of the most recently read message
    async fn acknowledge(&self, response: &Response) -> Result<()>;

    /// Request shutdown without blocking
    fn close_async(&self);

    /// Block until the reader has shut down or the timeout elapses
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// A pipeline source of transactions
#[async_trait]
pub trait Input: Send + Sync {
    /// Start the input and take its transaction stream
    ///
    /// Fails with [`Error::AlreadyStarted`] on a second call.
    fn transaction_chan(&self) -> Result<TransactionReceiver>;

    /// Current connector state
    fn state(&self) -> ConnectorState;

    /// Snapshot of the input's counters
    fn metrics(&self) -> MetricsSnapshot;

    /// Request shutdown without blocking
    ///
    /// The input stops reading. A transaction already handed off still has
    /// its response acknowledged at the source before the input closes.
    fn close_async(&self);

    /// Request shutdown and stop waiting for in-flight responses
    fn abort(&self) {
        self.close_async();
    }

    /// Block until the input has shut down or the timeout elapses
    async fn wait_for_close(&self, timeout: Duration) -> Result<()>;
}

/// Drives a [`Reader`] with a reconnect loop
pub struct ReaderInput<R: Reader> {
    name: String,
    reader: Arc<R>,
    lifecycle: Arc<Lifecycle>,
    abort: CancellationToken,
    metrics: Arc<ConnectorMetrics>,
    reconnect_interval: Duration,
    started: AtomicBool,
}

impl<R: Reader> ReaderInput<R> {
    /// Create an input around a reader
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self::from_arc(name, Arc::new(reader))
    }

    /// Create an input around a shared reader
    pub fn from_arc(name: impl Into<String>, reader: Arc<R>) -> Self {
        let name = name.into();
        Self {
            metrics: Arc::new(ConnectorMetrics::for_connector(ConnectorKind::Input, &name)),
            name,
            reader,
            lifecycle: Arc::new(Lifecycle::new()),
            abort: CancellationToken::new(),
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

    /// The wrapped reader
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

#[async_trait]
impl<R: Reader> Input for ReaderInput<R> {
    fn transaction_chan(&self) -> Result<TransactionReceiver> {
        if !self.lifecycle.is_running() {
            return Err(Error::ShuttingDown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        let (tx, rx) = handoff();
        let service = InputLoop {
            reader: Arc::clone(&self.reader),
            lifecycle: Arc::clone(&self.lifecycle),
            abort: self.abort.clone(),
            metrics: Arc::clone(&self.metrics),
            reconnector: Reconnector::new(
                format!("input.{}", self.name),
                self.reconnect_interval,
                Arc::clone(&self.lifecycle),
                Arc::clone(&self.metrics),
            ),
        };
        tokio::spawn(service.run(tx));
        Ok(rx)
    }

    fn state(&self) -> ConnectorState {
        self.lifecycle.state()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn close_async(&self) {
        self.lifecycle.close_async();
        // Never started: no loop will close the reader or confirm the close.
        if !self.started.swap(true, Ordering::AcqRel) {
            self.reader.close_async();
            drop(self.lifecycle.closed_guard());
        }
    }

    fn abort(&self) {
        self.abort.cancel();
        self.close_async();
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        self.lifecycle.wait_for_close(timeout).await?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.reader.wait_for_close(remaining).await
    }
}

/// Finish a reader's close request
///
/// Runs `teardown` in the background and publishes the closed confirmation
/// once it completes or the teardown grace period elapses. Outside a
/// runtime the teardown is skipped and the session is simply dropped.
pub(crate) fn finish_close(lifecycle: &Arc<Lifecycle>, name: &str, teardown: Teardown) {
    let closed = lifecycle.closed_guard();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let name = name.to_string();
            handle.spawn(async move {
                finish_teardown(&name, teardown).await;
                drop(closed);
            });
        }
        Err(_) => drop(closed),
    }
}

/// State owned by the spawned supervisory task
struct InputLoop<R: Reader> {
    reader: Arc<R>,
    lifecycle: Arc<Lifecycle>,
    abort: CancellationToken,
    metrics: Arc<ConnectorMetrics>,
    reconnector: Reconnector,
}

impl<R: Reader> InputLoop<R> {
    async fn run(self, transactions: TransactionSender) {
        let _closed = self.lifecycle.closed_guard();
        self.metrics.loop_started();

        self.serve(&transactions).await;

        self.reader.close_async();
        self.metrics.loop_stopped();
    }

    async fn serve(&self, transactions: &TransactionSender) {
        let token = self.lifecycle.close_token();
        let reader: &R = &self.reader;
        let name = self.reconnector.name();

        if self
            .reconnector
            .connect(false, move || reader.connect())
            .await
            .is_cancelled()
        {
            return;
        }
        info!(connector = %name, "Receiving messages");

        loop {
            let message = match cancellable(token, reader.read()).await {
                Outcome::Cancelled => return,
                Outcome::Ready(Ok(message)) => message,
                Outcome::Ready(Err(Error::NotConnected)) => {
                    self.lifecycle.set_state(ConnectorState::Disconnected);
                    if self
                        .reconnector
                        .connect(true, move || reader.connect())
                        .await
                        .is_cancelled()
                    {
                        return;
                    }
                    continue;
                }
                Outcome::Ready(Err(e)) => {
                    self.metrics.record_read_error();
                    error!(connector = %name, error = %e, "Failed to read message");
                    if sleep_or_cancel(token, self.reconnector.interval())
                        .await
                        .is_cancelled()
                    {
                        return;
                    }
                    continue;
                }
            };
            self.metrics.record_message();

            let (ts, pending) = Transaction::new(message);
            match cancellable(token, transactions.send(ts)).await {
                Outcome::Cancelled => return,
                Outcome::Ready(Err(_)) => {
                    debug!(connector = %name, "Downstream stopped receiving transactions");
                    return;
                }
                Outcome::Ready(Ok(())) => {}
            }

            // Once handed off, the response is awaited even after a close
            // request, so a graceful stop still acknowledges it.
            let response = match cancellable(&self.abort, pending.recv()).await {
                Outcome::Cancelled => return,
                Outcome::Ready(response) => response,
            };
            if let Err(e) = &response {
                debug!(connector = %name, error = %e, "Message was not delivered");
            }

            match cancellable(&self.abort, reader.acknowledge(&response)).await {
                Outcome::Cancelled => return,
                Outcome::Ready(Ok(())) => self.metrics.record_ack(response.is_ok()),
                Outcome::Ready(Err(e)) => {
                    self.metrics.record_ack(false);
                    warn!(connector = %name, error = %e, "Failed to acknowledge message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
