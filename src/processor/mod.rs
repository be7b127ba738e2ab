//! Processor module
//!
//! Supports: archive, compress
//!
//! # Overview
//!
//! Processors are pure, synchronous message transformations run by a
//! pipeline stage. A processor maps one message to zero or more messages;
//! zero means the message was dropped on purpose.

mod archive;
mod compress;
mod types;

pub use archive::ArchiveProcessor;
pub use compress::CompressProcessor;
pub use types::{
    ArchiveConfig, ArchiveFormat, CompressAlgorithm, CompressConfig, Processor, ProcessorConfig,
};

#[cfg(test)]
mod tests;
