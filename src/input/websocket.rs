//! Websocket input
//!
//! Reads one single-part message per text or binary frame. The source has no
//! acknowledgment protocol, so [`Reader::acknowledge`] is a no-op.

use super::{finish_close, Reader};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::lifecycle::{cancellable, Lifecycle, Outcome};
use crate::message::Message;
use crate::session::SessionSlot;
use crate::transaction::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for [`WebsocketReader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebsocketReaderConfig {
    /// Websocket URL
    pub url: String,
    /// Handshake authentication
    pub auth: AuthConfig,
}

impl Default for WebsocketReaderConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4195/get/ws".to_string(),
            auth: AuthConfig::None,
        }
    }
}

/// Reader consuming frames from a websocket
pub struct WebsocketReader {
    config: WebsocketReaderConfig,
    auth: Authenticator,
    socket: SessionSlot<Mutex<Socket>>,
    lifecycle: Arc<Lifecycle>,
}

impl WebsocketReader {
    /// Create a disconnected reader
    pub fn new(config: WebsocketReaderConfig) -> Self {
        Self {
            auth: Authenticator::new(config.auth.clone()),
            config,
            socket: SessionSlot::new(),
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Reader configuration
    pub fn config(&self) -> &WebsocketReaderConfig {
        &self.config
    }

    async fn handshake(&self) -> Result<Socket> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::connect(format!("websocket URL: {e}")))?;
        self.auth.sign_handshake(&mut request)?;

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::connect(format!("websocket handshake: {e}")))?;
        Ok(socket)
    }
}

async fn close_socket(socket: Arc<Mutex<Socket>>) {
    let mut socket = socket.lock().await;
    if let Err(e) = socket.close(None).await {
        debug!(error = %e, "Websocket close handshake failed");
    }
}

#[async_trait]
impl Reader for WebsocketReader {
    async fn connect(&self) -> Result<()> {
        if self.socket.is_connected() {
            return Ok(());
        }
        if !self.lifecycle.is_running() {
            return Err(Error::ShuttingDown);
        }

        let socket = self.handshake().await?;
        let (installed, rejected) = self.socket.install(Mutex::new(socket));
        if let Some(extra) = rejected {
            close_socket(Arc::new(extra)).await;
        }

        // A close request that raced the handshake already found the slot empty.
        if !self.lifecycle.is_running() {
            if self.socket.drop_if_current(&installed) {
                close_socket(installed).await;
            }
            return Err(Error::ShuttingDown);
        }
        debug!(url = %self.config.url, "Websocket connected");
        Ok(())
    }

    async fn read(&self) -> Result<Message> {
        let socket = self.socket.get().ok_or(Error::NotConnected)?;
        let token = self.lifecycle.close_token();

        let mut stream = match cancellable(token, socket.lock()).await {
            Outcome::Ready(stream) => stream,
            Outcome::Cancelled => return Err(Error::NotConnected),
        };

        loop {
            let frame = match cancellable(token, stream.next()).await {
                Outcome::Cancelled => return Err(Error::NotConnected),
                Outcome::Ready(frame) => frame,
            };

            match frame {
                Some(Ok(frame @ (Frame::Text(_) | Frame::Binary(_)))) => {
                    return Ok(Message::single(Bytes::from(frame.into_data())));
                }
                Some(Ok(Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_))) => continue,
                Some(Ok(Frame::Close(frame))) => {
                    debug!(url = %self.config.url, ?frame, "Websocket closed by peer");
                }
                Some(Err(e)) => {
                    warn!(url = %self.config.url, error = %e, "Websocket read failed");
                }
                None => {
                    debug!(url = %self.config.url, "Websocket stream ended");
                }
            }

            drop(stream);
            self.socket.drop_if_current(&socket);
            return Err(Error::NotConnected);
        }
    }

    async fn acknowledge(&self, _response: &Response) -> Result<()> {
        Ok(())
    }

    fn close_async(&self) {
        if !self.lifecycle.close_async() {
            return;
        }
        match self.socket.take() {
            Some(socket) => finish_close(
                &self.lifecycle,
                &self.config.url,
                close_socket(socket).map(Ok).boxed(),
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
        let config = WebsocketReaderConfig::default();
        assert_eq!(config.url, "ws://localhost:4195/get/ws");
        assert!(config.auth.is_none());
    }

    #[tokio::test]
    async fn test_read_without_session_does_not_block() {
        let reader = WebsocketReader::new(WebsocketReaderConfig::default());
        let result = tokio::time::timeout(Duration::from_secs(1), reader.read())
            .await
            .expect("read blocked without a session");
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_acknowledge_is_noop() {
        let reader = WebsocketReader::new(WebsocketReaderConfig::default());
        reader.acknowledge(&Ok(())).await.unwrap();
        reader
            .acknowledge(&Err(Error::NoAcknowledgment))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_without_session() {
        let reader = WebsocketReader::new(WebsocketReaderConfig::default());
        reader.close_async();
        reader.close_async();
        reader.wait_for_close(Duration::ZERO).await.unwrap();
        assert!(matches!(reader.connect().await, Err(Error::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let reader = WebsocketReader::new(WebsocketReaderConfig {
            url: "ws://127.0.0.1:1/ws".to_string(),
            ..WebsocketReaderConfig::default()
        });
        let err = reader.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailure { .. }));
    }
}
