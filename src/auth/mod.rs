//! Authentication module
//!
//! Supports: Basic, Bearer, API key header, custom headers
//!
//! The `Authenticator` turns an [`AuthConfig`] into request headers. The
//! same headers are applied to HTTP requests (`reqwest`) and to websocket
//! handshakes, so every transport signs its session the same way.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::AuthConfig;
