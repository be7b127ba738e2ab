//! Acknowledgment bridge
//!
//! Turns a message into a single delivery verdict. Parts are published
//! strictly in order and one at a time: a part's confirmation must arrive
//! before the next part is sent, which keeps each session's confirmation
//! stream unambiguous. The first failing part ends the attempt and later
//! parts are never sent.
//!
//! Session policy:
//!
//! - a failed publish call, or a confirmation that fails because the session
//!   broke, drops the session so the loop reconnects;
//! - a negative confirmation (`NoAcknowledgment`) keeps the session.

use super::writer::Writer;
use crate::error::Error;
use crate::lifecycle::{cancellable, spawn_teardown, Outcome};
use crate::message::Message;
use crate::metrics::ConnectorMetrics;
use crate::reconnect::Reconnector;
use crate::transaction::Response;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of delivering one message
#[derive(Debug)]
pub enum Delivery {
    /// Every part was confirmed, or the first failure
    Complete(Response),
    /// Shutdown was requested before a verdict; no response is written
    Cancelled,
}

/// Delivers messages through a writer
pub struct AckBridge<'a, W: Writer + ?Sized> {
    writer: &'a W,
    reconnector: &'a Reconnector,
    token: &'a CancellationToken,
    metrics: &'a ConnectorMetrics,
}

impl<'a, W: Writer + ?Sized> AckBridge<'a, W> {
    /// Create a bridge over a writer
    pub fn new(
        writer: &'a W,
        reconnector: &'a Reconnector,
        token: &'a CancellationToken,
        metrics: &'a ConnectorMetrics,
    ) -> Self {
        Self {
            writer,
            reconnector,
            token,
            metrics,
        }
    }

    /// Publish every part of `message` and produce one verdict
    pub async fn deliver(&self, message: &Message) -> Delivery {
        for (index, part) in message.iter().enumerate() {
            if !self.writer.is_connected() {
                let writer = self.writer;
                if self
                    .reconnector
                    .connect(true, move || writer.connect())
                    .await
                    .is_cancelled()
                {
                    return Delivery::Cancelled;
                }
            }

            match self.publish_part(part).await {
                Outcome::Cancelled => return Delivery::Cancelled,
                Outcome::Ready(Ok(())) => self.metrics.record_send_success(),
                Outcome::Ready(Err(e)) => {
                    self.metrics.record_send_error();
                    debug!(
                        connector = %self.reconnector.name(),
                        part = index,
                        error = %e,
                        "Message part failed, abandoning remaining parts"
                    );
                    return Delivery::Complete(Err(e));
                }
            }
        }
        Delivery::Complete(Ok(()))
    }

    async fn publish_part(&self, part: &Bytes) -> Outcome<Response> {
        let confirm = match cancellable(self.token, self.writer.publish(part)).await {
            Outcome::Cancelled => return Outcome::Cancelled,
            Outcome::Ready(Ok(confirm)) => confirm,
            Outcome::Ready(Err(e)) => {
                self.drop_session();
                return Outcome::Ready(Err(match e {
                    Error::NotConnected | Error::PublishFailure { .. } => e,
                    other => Error::publish(other.to_string()),
                }));
            }
        };

        match cancellable(self.token, confirm).await {
            Outcome::Cancelled => Outcome::Cancelled,
            Outcome::Ready(Ok(())) => Outcome::Ready(Ok(())),
            Outcome::Ready(Err(e)) => {
                if e.is_recoverable() {
                    self.drop_session();
                }
                Outcome::Ready(Err(e))
            }
        }
    }

    /// Release the session now and close it with the peer in the background
    fn drop_session(&self) {
        spawn_teardown(self.reconnector.name(), self.writer.disconnect());
    }
}
