//! HTTP output
//!
//! Sends each message part as the body of one request. A transport error
//! fails the publish itself; the response status is the confirmation, with
//! anything outside 2xx treated as a refusal.

use super::writer::{confirmed, publish_error, PendingConfirm, Writer};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::lifecycle::Teardown;
use crate::session::SessionSlot;
use async_trait::async_trait;
use bytes::Bytes;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token bucket settings for outgoing requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Bucket size
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_burst() -> u32 {
    1
}

/// Configuration for [`HttpWriter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpWriterConfig {
    /// Target URL
    pub url: String,
    /// HTTP method
    pub verb: String,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Optional request rate limit
    pub rate_limit: Option<RateLimitConfig>,
    /// Request authentication
    pub auth: AuthConfig,
}

impl Default for HttpWriterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4195/post".to_string(),
            verb: "POST".to_string(),
            headers: HashMap::from([(
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            )]),
            timeout_ms: 5000,
            rate_limit: None,
            auth: AuthConfig::None,
        }
    }
}

/// Writer sending each part as an HTTP request
pub struct HttpWriter {
    config: HttpWriterConfig,
    method: Method,
    auth: Authenticator,
    limiter: Option<DirectLimiter>,
    client: SessionSlot<Client>,
}

impl std::fmt::Debug for HttpWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWriter")
            .field("url", &self.config.url)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl HttpWriter {
    /// Create a disconnected writer
    ///
    /// Fails when the configured verb is not a valid HTTP method.
    pub fn new(config: HttpWriterConfig) -> Result<Self> {
        let method = Method::from_bytes(config.verb.to_uppercase().as_bytes())
            .map_err(|_| Error::config(format!("invalid HTTP verb: {}", config.verb)))?;

        let limiter = config.rate_limit.as_ref().map(|rl| {
            let rps = NonZeroU32::new(rl.requests_per_second).unwrap_or(NonZeroU32::MIN);
            let burst = NonZeroU32::new(rl.burst_size).unwrap_or(NonZeroU32::MIN);
            RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))
        });

        Ok(Self {
            auth: Authenticator::new(config.auth.clone()),
            method,
            limiter,
            config,
            client: SessionSlot::new(),
        })
    }

    /// Writer configuration
    pub fn config(&self) -> &HttpWriterConfig {
        &self.config
    }
}

#[async_trait]
impl Writer for HttpWriter {
    async fn connect(&self) -> Result<()> {
        if self.client.is_connected() {
            return Ok(());
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .user_agent(format!("solidafy-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::connect(format!("HTTP client: {e}")))?;
        self.client.install(client);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn publish(&self, part: &Bytes) -> Result<PendingConfirm> {
        let client = self.client.get().ok_or(Error::NotConnected)?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let mut request = client
            .request(self.method.clone(), &self.config.url)
            .body(part.clone());
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        let request = self.auth.apply(request);

        let response = request.send().await.map_err(publish_error)?;
        let status = response.status();
        debug!(url = %self.config.url, status = %status, "HTTP part delivered");

        Ok(confirmed(if status.is_success() {
            Ok(())
        } else {
            Err(Error::NoAcknowledgment)
        }))
    }

    fn disconnect(&self) -> Teardown {
        self.client.take();
        confirmed(Ok(()))
    }
}
