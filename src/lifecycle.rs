//! Lifecycle controller shared by every connector
//!
//! Each connector owns one [`Lifecycle`]:
//!
//! - a running flag that flips from running to stopped exactly once
//!   (compare-and-swap, so concurrent close requests have a single effect),
//! - a close-request token broadcast to every suspension point of the loop,
//! - a state channel published by the supervisory loop, whose terminal
//!   [`ConnectorState::Closed`] value is the closed confirmation.
//!
//! Every blocking operation inside a loop goes through [`cancellable`] or
//! [`sleep_or_cancel`] and gets back an [`Outcome`], so cancellation is a
//! value rather than an ad hoc `select!` per call site.

use crate::error::{Error, Result};
use crate::types::ConnectorState;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a blocking operation raced against a close request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation finished first
    Ready(T),
    /// A close request arrived first
    Cancelled,
}

impl<T> Outcome<T> {
    /// Whether the close request won the race
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert into an option, dropping the cancelled case
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Race a future against a cancellation token
///
/// A close request that is already pending wins over a future that is
/// also ready.
pub async fn cancellable<F>(token: &CancellationToken, fut: F) -> Outcome<F::Output>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Outcome::Cancelled,
        value = fut => Outcome::Ready(value),
    }
}

/// Sleep for the given interval unless a close request arrives first
pub async fn sleep_or_cancel(token: &CancellationToken, interval: Duration) -> Outcome<()> {
    cancellable(token, tokio::time::sleep(interval)).await
}

/// Upper bound on a background session teardown before it is abandoned
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long shutdown waits on a session teardown before confirming the close
pub const TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Closes a session that was already released from its slot
pub type Teardown = BoxFuture<'static, Result<()>>;

/// Run a teardown in the background, abandoning it after [`TEARDOWN_TIMEOUT`]
///
/// Returns `None` outside a runtime, in which case the session is simply
/// dropped.
pub fn spawn_teardown(name: &str, teardown: Teardown) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let name = name.to_string();
    Some(handle.spawn(async move {
        match tokio::time::timeout(TEARDOWN_TIMEOUT, teardown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(connector = %name, error = %e, "Failed to close session"),
            Err(_) => warn!(connector = %name, "Session close timed out, abandoning it"),
        }
    }))
}

/// Tear a session down, waiting at most [`TEARDOWN_GRACE`] for the peer
///
/// A teardown still running after the grace period finishes in the
/// background, so an unresponsive peer never holds up a close.
pub async fn finish_teardown(name: &str, teardown: Teardown) {
    if let Some(task) = spawn_teardown(name, teardown) {
        let _ = tokio::time::timeout(TEARDOWN_GRACE, task).await;
    }
}

/// Shared shutdown and readiness protocol for a connector
#[derive(Debug)]
pub struct Lifecycle {
    running: AtomicBool,
    close_request: CancellationToken,
    state: watch::Sender<ConnectorState>,
}

impl Lifecycle {
    /// Create a lifecycle in the running, disconnected state
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectorState::Disconnected);
        Self {
            running: AtomicBool::new(true),
            close_request: CancellationToken::new(),
            state,
        }
    }

    /// Request shutdown without blocking
    ///
    /// Only the first call has an effect; it returns true.
    pub fn close_async(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.close_request.cancel();
            true
        } else {
            false
        }
    }

    /// Whether shutdown has not been requested yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Token that fires when shutdown is requested
    pub fn close_token(&self) -> &CancellationToken {
        &self.close_request
    }

    /// Current state as published by the loop
    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    /// Publish a new state
    ///
    /// Once closed, the state never changes again.
    pub fn set_state(&self, next: ConnectorState) {
        self.state.send_if_modified(|current| {
            if current.is_closed() || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Block until the loop has confirmed it is closed, or the timeout elapses
    pub async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.state.subscribe();
        let closed = tokio::time::timeout(timeout, rx.wait_for(|s| s.is_closed()))
            .await
            .is_ok();
        if closed {
            Ok(())
        } else {
            Err(Error::timeout(timeout))
        }
    }

    /// Arm the closed confirmation for a supervisory loop
    ///
    /// The returned guard publishes [`ConnectorState::Closed`] when dropped,
    /// whichever path the loop leaves by.
    pub fn closed_guard(self: &Arc<Self>) -> ClosedGuard {
        ClosedGuard {
            lifecycle: Arc::clone(self),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the closed confirmation on drop
#[derive(Debug)]
pub struct ClosedGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for ClosedGuard {
    fn drop(&mut self) {
        self.lifecycle.running.store(false, Ordering::Release);
        self.lifecycle.set_state(ConnectorState::Closed);
    }
}
