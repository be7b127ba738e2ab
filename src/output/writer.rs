//! Writer capability
//!
//! A [`Writer`] owns one session with an external sink and knows how to
//! publish a single message part over it. Publishing returns a
//! [`PendingConfirm`]: the sink's asynchronous verdict for that part. The
//! reconnect loop and acknowledgment bridge in this module drive any writer,
//! so a new sink only implements this trait.

use crate::error::{Error, Result};
use crate::lifecycle::Teardown;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

/// Confirmation of a single publish
///
/// Resolves to `Ok(())` when the sink durably accepted the part,
/// `Err(Error::NoAcknowledgment)` when it refused it, or a recoverable
/// error when the session broke before a verdict arrived.
pub type PendingConfirm = BoxFuture<'static, Result<()>>;

/// A confirmation that is already known
pub fn confirmed(result: Result<()>) -> PendingConfirm {
    Box::pin(futures::future::ready(result))
}

/// Session owner for an output sink
#[async_trait]
pub trait Writer: Send + Sync + 'static {
    /// Establish the session
    ///
    /// Returns immediately when already connected. Never retries on failure;
    /// that is the reconnect loop's job.
    async fn connect(&self) -> Result<()>;

    /// Whether a session is currently held
    fn is_connected(&self) -> bool;

    /// Publish one part
    ///
    /// Fails with [`Error::NotConnected`] without a session and with
    /// [`Error::PublishFailure`] when the sink rejects the send itself.
    async fn publish(&self, part: &Bytes) -> Result<PendingConfirm>;

    /// Release the session, if any
    ///
    /// The session leaves the writer before this returns, so
    /// [`Writer::is_connected`] is false right away. The returned future
    /// only closes the released session with the peer and may be run in
    /// the background or abandoned.
    fn disconnect(&self) -> Teardown;
}

/// Map a transport error raised while sending into a publish failure
pub(crate) fn publish_error(err: impl std::fmt::Display) -> Error {
    Error::publish(err.to_string())
}
