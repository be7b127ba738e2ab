//! Authenticator implementation
//!
//! Handles applying authentication to HTTP requests and websocket handshakes.

use super::types::AuthConfig;
use crate::error::{Error, Result};
use base64::Engine as _;
use reqwest::RequestBuilder;
use tokio_tungstenite::tungstenite::handshake::client::Request as HandshakeRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

/// Authenticator turns auth configuration into signed requests
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    config: AuthConfig,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// The underlying configuration
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Header name/value pairs this configuration adds to a request
    pub fn headers(&self) -> Vec<(String, String)> {
        match &self.config {
            AuthConfig::None => Vec::new(),
            AuthConfig::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                vec![("Authorization".to_string(), format!("Basic {encoded}"))]
            }
            AuthConfig::Bearer { token } => {
                vec![("Authorization".to_string(), format!("Bearer {token}"))]
            }
            AuthConfig::ApiKey {
                header,
                prefix,
                value,
            } => vec![(
                header.clone(),
                format!("{}{}", prefix.as_deref().unwrap_or(""), value),
            )],
            AuthConfig::Headers { headers } => headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Apply authentication to an HTTP request builder
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        self.headers()
            .into_iter()
            .fold(req, |req, (key, value)| req.header(key, value))
    }

    /// Apply authentication to a websocket handshake request
    pub fn sign_handshake(&self, req: &mut HandshakeRequest) -> Result<()> {
        for (key, value) in self.headers() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::config(format!("Invalid auth header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| Error::config(format!("Invalid auth header value for '{key}': {e}")))?;
            req.headers_mut().insert(name, value);
        }
        Ok(())
    }
}
