//! Compress processor
//!
//! Compresses each part independently with `flate2`.

use super::types::{CompressAlgorithm, Processor};
use crate::error::{Error, Result};
use crate::message::Message;
use bytes::Bytes;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;

/// Compresses every part of a message
#[derive(Debug, Clone, Copy)]
pub struct CompressProcessor {
    algorithm: CompressAlgorithm,
    level: Compression,
}

impl CompressProcessor {
    /// Create a compress processor; `level` is clamped to 0-9
    pub fn new(algorithm: CompressAlgorithm, level: u32) -> Self {
        Self {
            algorithm,
            level: Compression::new(level.min(9)),
        }
    }

    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let out = Vec::with_capacity(data.len() / 2);
        match self.algorithm {
            CompressAlgorithm::Gzip => {
                let mut enc = GzEncoder::new(out, self.level);
                enc.write_all(data)?;
                enc.finish()
            }
            CompressAlgorithm::Zlib => {
                let mut enc = ZlibEncoder::new(out, self.level);
                enc.write_all(data)?;
                enc.finish()
            }
            CompressAlgorithm::Deflate => {
                let mut enc = DeflateEncoder::new(out, self.level);
                enc.write_all(data)?;
                enc.finish()
            }
        }
    }
}

impl Processor for CompressProcessor {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn process(&self, message: Message) -> Result<Vec<Message>> {
        if message.is_empty() {
            return Ok(Vec::new());
        }

        let parts = message
            .iter()
            .map(|part| {
                self.compress(part)
                    .map(Bytes::from)
                    .map_err(|e| Error::processor(format!("compress: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(vec![Message::from(parts)])
    }
}
