//! CLI module
//!
//! Command-line interface for running a bridge.
//!
//! # Commands
//!
//! - `run` - Start the bridge and serve status endpoints until Ctrl-C
//! - `validate` - Parse the config and build every component
//! - `defaults` - Print the default configuration

mod commands;
mod runner;
mod server;

pub use commands::{Cli, Commands};
pub use runner::Runner;
pub use server::{router, serve};
