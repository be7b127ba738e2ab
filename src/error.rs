//! Error types for Solidafy Bridge
//!
//! This module defines the error hierarchy for the entire bridge.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Connection-level errors (`NotConnected`, `ConnectFailure`) are recovered
//! inside the reconnect loops. Message-level errors travel back to the input
//! that produced the message as the `Err` side of a [`crate::Response`].

use thiserror::Error;

/// The main error type for Solidafy Bridge
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Connection & Lifecycle Errors
    // ============================================================================
    #[error("Not connected to target source or sink")]
    NotConnected,

    #[error("Failed to connect: {message}")]
    ConnectFailure { message: String },

    #[error("Failed to publish: {message}")]
    PublishFailure { message: String },

    #[error("Failed to receive acknowledgment from sink")]
    NoAcknowledgment,

    #[error("Action timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Type has already been started")]
    AlreadyStarted,

    #[error("Connector is shutting down")]
    ShuttingDown,

    // ============================================================================
    // Processing Errors
    // ============================================================================
    #[error("Processor error: {message}")]
    Processor { message: String },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a connect failure
    pub fn connect(message: impl Into<String>) -> Self {
        Self::ConnectFailure {
            message: message.into(),
        }
    }

    /// Create a publish failure
    pub fn publish(message: impl Into<String>) -> Self {
        Self::PublishFailure {
            message: message.into(),
        }
    }

    /// Create a processor error
    pub fn processor(message: impl Into<String>) -> Self {
        Self::Processor {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error from a duration
    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Check if this error is recovered by re-establishing the session
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::ConnectFailure { .. }
                | Error::PublishFailure { .. }
                | Error::Http(_)
                | Error::Amqp(_)
                | Error::Websocket(_)
                | Error::Io(_)
        )
    }

    /// Check if a message that failed with this error should go back to its
    /// source for redelivery rather than being dropped
    pub fn should_requeue(&self) -> bool {
        match self {
            Error::NoAcknowledgment
            | Error::ShuttingDown
            | Error::Timeout { .. } => true,
            Error::Processor { .. }
            | Error::Config { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_)
            | Error::AlreadyStarted => false,
            other => other.is_recoverable(),
        }
    }
}

/// Result type alias for Solidafy Bridge
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NotConnected.to_string(),
            "Not connected to target source or sink"
        );
        assert_eq!(
            Error::connect("refused").to_string(),
            "Failed to connect: refused"
        );
        assert_eq!(
            Error::timeout(Duration::from_millis(250)).to_string(),
            "Action timed out after 250ms"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::NotConnected.is_recoverable());
        assert!(Error::connect("x").is_recoverable());
        assert!(Error::publish("x").is_recoverable());

        assert!(!Error::NoAcknowledgment.is_recoverable());
        assert!(!Error::AlreadyStarted.is_recoverable());
        assert!(!Error::config("x").is_recoverable());
    }

    #[test]
    fn test_should_requeue() {
        assert!(Error::NoAcknowledgment.should_requeue());
        assert!(Error::ShuttingDown.should_requeue());
        assert!(Error::NotConnected.should_requeue());
        assert!(Error::publish("broken pipe").should_requeue());

        assert!(!Error::processor("bad input").should_requeue());
        assert!(!Error::config("bad").should_requeue());
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::NotConnected);
        let with_context = result.context("reading");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("reading: Not connected"));
    }
}
