//! Archive processor
//!
//! Combines every part of a message into a single part.

use super::types::{ArchiveFormat, Processor};
use crate::error::{Error, Result};
use crate::message::Message;
use bytes::{BufMut, Bytes, BytesMut};

/// Combines a message's parts into one
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveProcessor {
    format: ArchiveFormat,
}

impl ArchiveProcessor {
    /// Create an archive processor
    pub fn new(format: ArchiveFormat) -> Self {
        Self { format }
    }

    /// Output format
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }
}

impl Processor for ArchiveProcessor {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn process(&self, message: Message) -> Result<Vec<Message>> {
        if message.is_empty() {
            return Ok(Vec::new());
        }

        let archived = match self.format {
            ArchiveFormat::Binary => message.to_binary(),
            ArchiveFormat::Tar => tar_parts(&message)?,
            ArchiveFormat::Lines | ArchiveFormat::Concatenate => {
                let separators = match self.format {
                    ArchiveFormat::Lines => message.len() - 1,
                    _ => 0,
                };
                let mut buf = BytesMut::with_capacity(message.byte_len() + separators);
                for (i, part) in message.iter().enumerate() {
                    if i > 0 && self.format == ArchiveFormat::Lines {
                        buf.put_u8(b'\n');
                    }
                    buf.put_slice(part);
                }
                buf.freeze()
            }
        };
        Ok(vec![Message::single(archived)])
    }
}

/// Write each part as a tar entry named after its position
fn tar_parts(message: &Message) -> Result<Bytes> {
    let mut builder = tar::Builder::new(Vec::with_capacity(message.byte_len() + 1024));
    for (i, part) in message.iter().enumerate() {
        let mut header = tar::Header::new_gnu();
        header.set_size(part.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("part-{i}"), part.as_ref())
            .map_err(|e| Error::processor(format!("tar entry {i}: {e}")))?;
    }
    let data = builder
        .into_inner()
        .map_err(|e| Error::processor(format!("tar: {e}")))?;
    Ok(Bytes::from(data))
}
