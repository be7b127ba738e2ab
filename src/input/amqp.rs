//! AMQP input
//!
//! Consumes a durable queue bound to an exchange. Each delivery becomes a
//! single-part message; its downstream outcome is passed back to the broker
//! as an ack, or as a nack that requeues whenever the failure is worth a
//! redelivery.

use super::{finish_close, Reader};
use crate::error::{Error, Result};
use crate::lifecycle::{cancellable, Lifecycle, Outcome};
use crate::message::Message;
use crate::output::exchange_kind;
use crate::session::SessionSlot;
use crate::transaction::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, Consumer};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Configuration for [`AmqpReader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpReaderConfig {
    /// Broker URL
    pub url: String,
    /// Exchange the queue is bound to; empty skips the declaration
    pub exchange: String,
    /// Exchange type
    pub exchange_type: String,
    /// Queue to consume
    pub queue: String,
    /// Binding key
    pub key: String,
    /// Consumer tag
    pub consumer_tag: String,
    /// Maximum unacknowledged deliveries
    pub prefetch_count: u16,
}

impl Default for AmqpReaderConfig {
    fn default() -> Self {
        Self {
            url: crate::output::DEFAULT_AMQP_URL.to_string(),
            exchange: "solidafy-exchange".to_string(),
            exchange_type: "direct".to_string(),
            queue: "solidafy-queue".to_string(),
            key: "solidafy-key".to_string(),
            consumer_tag: "solidafy-consumer".to_string(),
            prefetch_count: 10,
        }
    }
}

struct AmqpSession {
    connection: Connection,
    consumer: Mutex<Consumer>,
}

/// Reader consuming an AMQP queue
pub struct AmqpReader {
    config: AmqpReaderConfig,
    session: SessionSlot<AmqpSession>,
    pending: StdMutex<Option<Acker>>,
    lifecycle: Arc<Lifecycle>,
}

impl AmqpReader {
    /// Create a disconnected reader
    pub fn new(config: AmqpReaderConfig) -> Self {
        Self {
            config,
            session: SessionSlot::new(),
            pending: StdMutex::new(None),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Reader configuration
    pub fn config(&self) -> &AmqpReaderConfig {
        &self.config
    }

    fn take_pending(&self) -> Option<Acker> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn set_pending(&self, acker: Acker) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(acker);
    }

    fn release(&self, session: Arc<AmqpSession>) {
        self.session.release(&self.config.url, session, |s| {
            close_session(s).map(Ok).boxed()
        });
    }

    async fn open(&self) -> Result<AmqpSession> {
        let cfg = &self.config;
        let connection = Connection::connect(&cfg.url, ConnectionProperties::default())
            .await
            .map_err(|e| Error::connect(format!("AMQP dial: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::connect(format!("AMQP channel: {e}")))?;

        if !cfg.exchange.is_empty() {
            channel
                .exchange_declare(
                    &cfg.exchange,
                    exchange_kind(&cfg.exchange_type),
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| Error::connect(format!("exchange declare: {e}")))?;
        }

        channel
            .queue_declare(
                &cfg.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connect(format!("queue declare: {e}")))?;

        if !cfg.exchange.is_empty() {
            channel
                .queue_bind(
                    &cfg.queue,
                    &cfg.exchange,
                    &cfg.key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| Error::connect(format!("queue bind: {e}")))?;
        }

        channel
            .basic_qos(cfg.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| Error::connect(format!("qos: {e}")))?;

        let consumer = channel
            .basic_consume(
                &cfg.queue,
                &cfg.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connect(format!("consume: {e}")))?;

        Ok(AmqpSession {
            connection,
            consumer: Mutex::new(consumer),
        })
    }
}

async fn close_session(session: Arc<AmqpSession>) {
    if let Err(e) = session.connection.close(200, "closing").await {
        debug!(error = %e, "Failed to close AMQP connection");
    }
}

#[async_trait]
impl Reader for AmqpReader {
    async fn connect(&self) -> Result<()> {
        if self.session.is_connected() {
            return Ok(());
        }
        if !self.lifecycle.is_running() {
            return Err(Error::ShuttingDown);
        }

        let session = self.open().await?;
        let (installed, rejected) = self.session.install(session);
        if let Some(extra) = rejected {
            close_session(Arc::new(extra)).await;
        }

        if !self.lifecycle.is_running() {
            if self.session.drop_if_current(&installed) {
                close_session(installed).await;
            }
            return Err(Error::ShuttingDown);
        }
        debug!(url = %self.config.url, queue = %self.config.queue, "AMQP consumer started");
        Ok(())
    }

    async fn read(&self) -> Result<Message> {
        let session = self.session.get().ok_or(Error::NotConnected)?;
        let token = self.lifecycle.close_token();

        let next = {
            let mut consumer = match cancellable(token, session.consumer.lock()).await {
                Outcome::Ready(consumer) => consumer,
                Outcome::Cancelled => return Err(Error::NotConnected),
            };
            match cancellable(token, consumer.next()).await {
                Outcome::Ready(next) => next,
                Outcome::Cancelled => return Err(Error::NotConnected),
            }
        };

        match next {
            Some(Ok(delivery)) => {
                self.set_pending(delivery.acker);
                Ok(Message::single(Bytes::from(delivery.data)))
            }
            Some(Err(e)) => {
                warn!(queue = %self.config.queue, error = %e, "AMQP consume failed");
                self.release(session);
                Err(Error::NotConnected)
            }
            None => {
                debug!(queue = %self.config.queue, "AMQP consumer cancelled");
                self.release(session);
                Err(Error::NotConnected)
            }
        }
    }

    async fn acknowledge(&self, response: &Response) -> Result<()> {
        let Some(acker) = self.take_pending() else {
            return Ok(());
        };
        match response {
            Ok(()) => acker.ack(BasicAckOptions::default()).await?,
            Err(e) => {
                acker
                    .nack(BasicNackOptions {
                        requeue: e.should_requeue(),
                        ..BasicNackOptions::default()
                    })
                    .await?
            }
        }
        Ok(())
    }

    fn close_async(&self) {
        if !self.lifecycle.close_async() {
            return;
        }
        match self.session.take() {
            Some(session) => finish_close(
                &self.lifecycle,
                &self.config.url,
                close_session(session).map(Ok).boxed(),
            ),
            None => drop(self.lifecycle.closed_guard()),
        }
    }

    async fn wait_for_close(&self, timeout: Duration) -> Result<()> {
        self.lifecycle.wait_for_close(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AmqpReaderConfig::default();
        assert_eq!(config.queue, "solidafy-queue");
        assert_eq!(config.prefetch_count, 10);
    }

    #[tokio::test]
    async fn test_read_without_session() {
        let reader = AmqpReader::new(AmqpReaderConfig::default());
        assert!(matches!(reader.read().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_acknowledge_without_pending_delivery() {
        let reader = AmqpReader::new(AmqpReaderConfig::default());
        reader.acknowledge(&Ok(())).await.unwrap();
        reader.acknowledge(&Err(Error::ShuttingDown)).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_effect_once() {
        let reader = AmqpReader::new(AmqpReaderConfig::default());
        reader.close_async();
        reader.close_async();
        reader.wait_for_close(Duration::ZERO).await.unwrap();
        assert!(matches!(reader.connect().await, Err(Error::ShuttingDown)));
    }
}
