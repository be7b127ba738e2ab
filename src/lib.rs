// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Bridge
//!
//! A Rust-native message bridge that moves multi-part messages between
//! transports with at-least-once delivery.
//!
//! ## Features
//!
//! - **Reconnecting Connectors**: Every input and output keeps its session
//!   alive with a fixed-backoff reconnect loop
//! - **Acknowledgment Protocol**: A message is acknowledged at its source
//!   only once the sink confirmed every part
//! - **Graceful Shutdown**: Idempotent close requests and bounded waits
//! - **Transports**: Websocket and AMQP inputs, AMQP and HTTP outputs
//! - **Processors**: Archive and compress stages between input and output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_bridge::{load_config, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = load_config("bridge.yaml")?;
//!     let bridge = config.build()?;
//!     bridge.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bridge.stop(Duration::from_secs(20)).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   Transaction   ┌────────────────┐   Transaction   ┌──────────────┐
//! │    Input     │ ──────────────▶ │ ProcessorStage │ ──────────────▶ │    Output    │
//! │ Reader +     │                 │ archive,       │                 │ Writer +     │
//! │ reconnect    │ ◀────────────── │ compress       │ ◀────────────── │ reconnect +  │
//! │ loop         │    Response     │                │    Response     │ ack bridge   │
//! └──────────────┘                 └────────────────┘                 └──────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the bridge
pub mod error;

/// Common types and type aliases
pub mod types;

/// Multi-part messages
pub mod message;

/// Transactions and their responses
pub mod transaction;

/// Shutdown and readiness protocol
pub mod lifecycle;

/// Session handle storage
pub mod session;

/// Connector counters
pub mod metrics;

/// Reconnect loop
pub mod reconnect;

/// Authentication implementations
pub mod auth;

/// Input connectors
pub mod input;

/// Output connectors
pub mod output;

/// Message processors
pub mod processor;

/// Pipeline wiring
pub mod pipeline;

/// Configuration and loaders
pub mod config;

/// Scripted in-memory connectors for tests
pub mod testing;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::{load_config, load_config_from_str, BridgeConfig};
pub use input::{Input, Reader, ReaderInput};
pub use message::Message;
pub use output::{Output, Writer, WriterOutput};
pub use pipeline::{Bridge, ProcessorStage};
pub use transaction::{Response, Transaction};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
