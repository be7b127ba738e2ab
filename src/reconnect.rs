//! Reconnect loop
//!
//! [`Reconnector`] drives a connector's `connect()` until it succeeds or a
//! close request arrives. Failed attempts wait a fixed interval; the wait is
//! a cancellation point. Connection errors never escape this loop: they are
//! logged and counted, then retried.

use crate::error::Result;
use crate::lifecycle::{cancellable, sleep_or_cancel, Lifecycle, Outcome};
use crate::metrics::ConnectorMetrics;
use crate::types::ConnectorState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default fixed interval between connection attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Supervises session establishment for one connector
#[derive(Debug, Clone)]
pub struct Reconnector {
    name: String,
    interval: Duration,
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<ConnectorMetrics>,
}

impl Reconnector {
    /// Create a reconnector for the named connector
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        lifecycle: Arc<Lifecycle>,
        metrics: Arc<ConnectorMetrics>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            lifecycle,
            metrics,
        }
    }

    /// Connector name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempt `connect` until it succeeds or shutdown is requested
    ///
    /// `lost` marks a reconnect after a previously live session, which is
    /// logged as a warning rather than as the initial connection.
    pub async fn connect<F, Fut>(&self, lost: bool, mut connect: F) -> Outcome<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let token = self.lifecycle.close_token();
        if lost {
            warn!(connector = %self.name, "Lost connection, attempting to reconnect");
        }
        self.lifecycle.set_state(ConnectorState::Connecting);

        loop {
            match cancellable(token, connect()).await {
                Outcome::Cancelled => return Outcome::Cancelled,
                Outcome::Ready(Ok(())) => {
                    self.metrics.record_reconnect_success();
                    self.lifecycle.set_state(ConnectorState::Connected);
                    if lost {
                        warn!(connector = %self.name, "Successfully reconnected");
                    } else {
                        info!(connector = %self.name, "Connected");
                    }
                    return Outcome::Ready(());
                }
                Outcome::Ready(Err(e)) => {
                    self.metrics.record_reconnect_error();
                    error!(connector = %self.name, error = %e, "Failed to connect");
                    if sleep_or_cancel(token, self.interval).await.is_cancelled() {
                        return Outcome::Cancelled;
                    }
                }
            }
        }
    }
}
