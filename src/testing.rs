//! Scripted in-memory connectors
//!
//! [`MockWriter`] and [`MockReader`] implement the connector traits without
//! any network. Tests script their behaviour (failed connects, refused
//! publishes, negative confirmations, dropped sessions) and then inspect what
//! the supervisory loops did with them.

use crate::error::{Error, Result};
use crate::input::Reader;
use crate::lifecycle::{cancellable, Lifecycle, Outcome, Teardown};
use crate::message::Message;
use crate::output::{confirmed, PendingConfirm, Writer};
use crate::transaction::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take one scripted connect failure, if any remain
fn consume_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

// ============================================================================
// MockWriter
// ============================================================================

/// Scripted outcome of one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishScript {
    /// Accepted and positively confirmed
    Ack,
    /// Accepted but negatively confirmed
    Nack,
    /// The publish call itself fails
    Fail,
    /// Accepted, confirmation never arrives
    Pending,
    /// Accepted and positively confirmed after a delay
    Delayed(Duration),
}

/// In-memory [`Writer`]
///
/// Publishes follow the queued script; once it runs out every publish is
/// acknowledged.
#[derive(Debug, Default)]
pub struct MockWriter {
    connect_failures: AtomicUsize,
    connected: AtomicBool,
    connects: AtomicUsize,
    connect_attempts: AtomicUsize,
    disconnects: AtomicUsize,
    hang_on_close: AtomicBool,
    script: Mutex<VecDeque<PublishScript>>,
    published: Mutex<Vec<Bytes>>,
}

impl MockWriter {
    /// Create a writer that connects and acknowledges everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts
    #[must_use]
    pub fn fail_connects(self, n: usize) -> Self {
        self.connect_failures.store(n, Ordering::Release);
        self
    }

    /// Queue publish outcomes
    #[must_use]
    pub fn with_script(self, script: impl IntoIterator<Item = PublishScript>) -> Self {
        lock(&self.script).extend(script);
        self
    }

    /// Never finish closing a released session, like an unresponsive peer
    #[must_use]
    pub fn hang_on_close(self) -> Self {
        self.hang_on_close.store(true, Ordering::Release);
        self
    }

    /// Parts accepted by publish, in order
    pub fn published(&self) -> Vec<Bytes> {
        lock(&self.published).clone()
    }

    /// Successful connects
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }

    /// All connect attempts, failed or not
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::Acquire)
    }

    /// Sessions released through disconnect
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Writer for MockWriter {
    async fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.connect_attempts.fetch_add(1, Ordering::AcqRel);
        if consume_failure(&self.connect_failures) {
            return Err(Error::connect("scripted connect failure"));
        }
        self.connected.store(true, Ordering::Release);
        self.connects.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn publish(&self, part: &Bytes) -> Result<PendingConfirm> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let step = lock(&self.script).pop_front().unwrap_or(PublishScript::Ack);
        if step == PublishScript::Fail {
            return Err(Error::publish("scripted publish failure"));
        }

        lock(&self.published).push(part.clone());
        Ok(match step {
            PublishScript::Nack => confirmed(Err(Error::NoAcknowledgment)),
            PublishScript::Pending => futures::future::pending().boxed(),
            PublishScript::Delayed(delay) => async move {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            .boxed(),
            _ => confirmed(Ok(())),
        })
    }

    fn disconnect(&self) -> Teardown {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return confirmed(Ok(()));
        }
        self.disconnects.fetch_add(1, Ordering::AcqRel);
        if self.hang_on_close.load(Ordering::Acquire) {
            futures::future::pending().boxed()
        } else {
            confirmed(Ok(()))
        }
    }
}

// ============================================================================
// MockReader
// ============================================================================

/// Scripted result of one read
#[derive(Debug, Clone)]
pub enum ReadScript {
    /// Deliver a message
    Message(Message),
    /// Break the session
    Drop,
}

/// Acknowledgment observed by a [`MockReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckRecord {
    /// Message delivered downstream
    Ack,
    /// Message failed downstream
    Nack {
        /// Whether the failure asked for redelivery
        requeue: bool,
    },
}

/// In-memory [`Reader`]
///
/// Reads block until a script item is pushed or a close request arrives.
#[derive(Debug)]
pub struct MockReader {
    connect_failures: AtomicUsize,
    connected: AtomicBool,
    connects: AtomicUsize,
    queue: Mutex<VecDeque<ReadScript>>,
    ready: Notify,
    acks: Mutex<Vec<AckRecord>>,
    lifecycle: Arc<Lifecycle>,
}

impl Default for MockReader {
    fn default() -> Self {
        Self {
            connect_failures: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            queue: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            acks: Mutex::new(Vec::new()),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }
}

impl MockReader {
    /// Create a reader with nothing to read
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts
    #[must_use]
    pub fn fail_connects(self, n: usize) -> Self {
        self.connect_failures.store(n, Ordering::Release);
        self
    }

    /// Queue a script item and wake a blocked read
    pub fn push(&self, item: ReadScript) {
        lock(&self.queue).push_back(item);
        self.ready.notify_one();
    }

    /// Queue a message
    pub fn push_message(&self, message: Message) {
        self.push(ReadScript::Message(message));
    }

    /// Acknowledgments received, in order
    pub fn acks(&self) -> Vec<AckRecord> {
        lock(&self.acks).clone()
    }

    /// Successful connects
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }

    /// Whether the reader has been closed
    pub fn is_closed(&self) -> bool {
        self.lifecycle.state().is_closed()
    }
}

#[async_trait]
impl Reader for MockReader {
    async fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        if consume_failure(&self.connect_failures) {
            return Err(Error::connect("scripted connect failure"));
        }
        self.connected.store(true, Ordering::Release);
        self.connects.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn read(&self) -> Result<Message> {
        loop {
            if !self.connected.load(Ordering::Acquire) {
                return Err(Error::NotConnected);
            }
            let next = lock(&self.queue).pop_front();
            match next {
                Some(ReadScript::Message(message)) => return Ok(message),
                Some(ReadScript::Drop) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(Error::NotConnected);
                }
                None => {
                    let token = self.lifecycle.close_token();
                    if let Outcome::Cancelled = cancellable(token, self.ready.notified()).await {
                        return Err(Error::NotConnected);
                    }
                }
            }
        }
    }

    async fn acknowledge(&self, response: &Response) -> Result<()> {
        let record = match response {
            Ok(()) => AckRecord::Ack,
            Err(e) => AckRecord::Nack {
                requeue: e.should_requeue(),
            },
        };
        lock(&self.acks).push(record);
        Ok(())
    }

    fn close_async(&self) {
        if self.lifecycle.close_async() {
            self.connected.store(false, Ordering::Release);
            drop(self.lifecycle.closed_guard());
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.wait_for_close(timeout).await
    }
}
