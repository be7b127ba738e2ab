//! Processor types and traits

use super::{ArchiveProcessor, CompressProcessor};
use crate::error::{Error, Result};
use crate::message::Message;
use serde::{Deserialize, Serialize};

/// A message transformation
pub trait Processor: Send + Sync {
    /// Processor name used in logs
    fn name(&self) -> &'static str;

    /// Transform one message
    ///
    /// An empty result drops the message, which counts as delivered. An
    /// error is reported back to the message's source.
    fn process(&self, message: Message) -> Result<Vec<Message>>;
}

/// How the archive processor combines parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Length-prefixed framing that can be split again losslessly
    #[default]
    Binary,
    /// Parts joined by newlines
    Lines,
    /// Parts appended back to back
    Concatenate,
    /// One tar entry per part, in order
    Tar,
}

/// Archive processor settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Output format
    pub format: ArchiveFormat,
}

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressAlgorithm {
    /// gzip (RFC 1952)
    #[default]
    Gzip,
    /// zlib (RFC 1950)
    Zlib,
    /// Raw deflate (RFC 1951)
    Deflate,
}

/// Compress processor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    /// Algorithm
    pub algorithm: CompressAlgorithm,
    /// Compression level, 0 (none) to 9 (best)
    pub level: u32,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressAlgorithm::Gzip,
            level: 6,
        }
    }
}

/// Configuration for one processor in a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    /// Combine all parts into one
    Archive {
        #[serde(default)]
        archive: ArchiveConfig,
    },
    /// Compress every part
    Compress {
        #[serde(default)]
        compress: CompressConfig,
    },
}

impl ProcessorConfig {
    /// Build the configured processor
    pub fn build(&self) -> Result<Box<dyn Processor>> {
        match self {
            Self::Archive { archive } => Ok(Box::new(ArchiveProcessor::new(archive.format))),
            Self::Compress { compress } => {
                if compress.level > 9 {
                    return Err(Error::config(format!(
                        "compression level must be 0-9, got {}",
                        compress.level
                    )));
                }
                Ok(Box::new(CompressProcessor::new(
                    compress.algorithm,
                    compress.level,
                )))
            }
        }
    }
}
