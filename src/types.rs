//! Common types used throughout Solidafy Bridge
//!
//! This module contains shared type definitions used across the
//! connector, pipeline and CLI modules.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Connector State
// ============================================================================

/// Observable state of a connector's supervisory loop
///
/// Transitions are published by the loop that owns the connector; every
/// other party only reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    /// No live session
    #[default]
    Disconnected,
    /// Establishing a session
    Connecting,
    /// Session established, serving work
    Connected,
    /// Loop exited, terminal
    Closed,
}

impl ConnectorState {
    /// Whether the state is terminal
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Connector Kind
// ============================================================================

/// Which side of the pipeline a connector sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Reads from an external source
    Input,
    /// Writes to an external sink
    Output,
    /// Processes messages between connectors
    Pipeline,
}

impl ConnectorKind {
    /// Prefix used for metric and log paths
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Pipeline => "pipeline",
        }
    }
}

// ============================================================================
// Log Level
// ============================================================================

/// Default log verbosity of the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
