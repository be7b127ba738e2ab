//! Transactions
//!
//! A [`Transaction`] pairs a [`Message`] with a single-use response sink.
//! Whoever holds the transaction terminally writes exactly one [`Response`]
//! into the sink; the input that created it reads that response exactly once.
//! Both halves are consumed on use, so double writes and double reads do not
//! compile.

use crate::error::{Error, Result};
use crate::message::Message;
use tokio::sync::{mpsc, oneshot};

/// Outcome of delivering a message downstream
pub type Response = Result<()>;

/// Sending half of the transaction handoff between pipeline stages
pub type TransactionSender = mpsc::Sender<Transaction>;

/// Receiving half of the transaction handoff between pipeline stages
pub type TransactionReceiver = mpsc::Receiver<Transaction>;

/// Create a handoff channel with room for a single transaction
///
/// Senders block until the consumer has taken the previous transaction,
/// which gives the pipeline its backpressure.
pub fn handoff() -> (TransactionSender, TransactionReceiver) {
    mpsc::channel(1)
}

/// A message travelling through the pipeline together with its response sink
#[derive(Debug)]
pub struct Transaction {
    /// The message payload
    pub payload: Message,
    /// Where the terminal holder reports the delivery outcome
    pub response: ResponseSink,
}

impl Transaction {
    /// Create a transaction and the receiver for its response
    pub fn new(payload: Message) -> (Self, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                payload,
                response: ResponseSink { tx },
            },
            ResponseReceiver { rx },
        )
    }

    /// Split into payload and response sink
    pub fn into_parts(self) -> (Message, ResponseSink) {
        (self.payload, self.response)
    }
}

/// Write-once sink for a transaction's response
#[derive(Debug)]
pub struct ResponseSink {
    tx: oneshot::Sender<Response>,
}

impl ResponseSink {
    /// Write the response, consuming the sink
    ///
    /// Returns false if the originator is no longer waiting.
    pub fn send(self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }

    /// Whether the originator has stopped waiting for a response
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read-once receiver for a transaction's response
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: oneshot::Receiver<Response>,
}

impl ResponseReceiver {
    /// Wait for the response
    ///
    /// A sink dropped without a response (its holder shut down) is reported
    /// as [`Error::ShuttingDown`].
    pub async fn recv(self) -> Response {
        self.rx.await.unwrap_or(Err(Error::ShuttingDown))
    }
}
