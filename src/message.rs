//! Multi-part messages
//!
//! A [`Message`] is an ordered sequence of opaque byte parts. Parts keep
//! their order through every stage of the pipeline. A message with zero
//! parts is representable and processors treat it as an empty input.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// An ordered, immutable set of byte parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    parts: Vec<Bytes>,
}

impl Message {
    /// Create a message from its parts
    pub fn new<I, B>(parts: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a message with a single part
    pub fn single(part: impl Into<Bytes>) -> Self {
        Self {
            parts: vec![part.into()],
        }
    }

    /// Create an empty message
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the message has no parts
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Get a part by index
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.parts.get(index)
    }

    /// All parts in order
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Iterate over the parts in order
    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> {
        self.parts.iter()
    }

    /// Consume the message, returning its parts
    pub fn into_parts(self) -> Vec<Bytes> {
        self.parts
    }

    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.parts.iter().map(Bytes::len).sum()
    }

    /// Serialize into the binary framing format
    ///
    /// Layout: `u32` big-endian part count, then for each part a `u32`
    /// big-endian length followed by the part bytes.
    pub fn to_binary(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.parts.len() * 4 + self.byte_len());
        buf.put_u32(self.parts.len() as u32);
        for part in &self.parts {
            buf.put_u32(part.len() as u32);
            buf.put_slice(part);
        }
        buf.freeze()
    }

    /// Parse a message from the binary framing format
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if buf.remaining() < 4 {
            return Err(Error::processor("binary message is missing its part count"));
        }
        let count = buf.get_u32() as usize;
        let mut parts = Vec::with_capacity(count.min(1024));
        for index in 0..count {
            if buf.remaining() < 4 {
                return Err(Error::processor(format!(
                    "binary message truncated at part {index} header"
                )));
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(Error::processor(format!(
                    "binary message truncated in part {index}"
                )));
            }
            parts.push(Bytes::copy_from_slice(&buf[..len]));
            buf.advance(len);
        }
        Ok(Self { parts })
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Bytes;
    type IntoIter = std::slice::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

impl From<Vec<Bytes>> for Message {
    fn from(parts: Vec<Bytes>) -> Self {
        Self { parts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_preserves_part_order() {
        let msg = Message::new(vec!["first", "second", "third"]);
        assert_eq!(msg.len(), 3);
        assert_eq!(msg.get(0).unwrap().as_ref(), b"first");
        assert_eq!(msg.get(2).unwrap().as_ref(), b"third");
        assert!(msg.get(3).is_none());
        assert_eq!(msg.byte_len(), 16);
    }

    #[test]
    fn test_empty_message() {
        let msg = Message::empty();
        assert!(msg.is_empty());
        assert_eq!(msg.to_binary().as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_binary_layout() {
        let msg = Message::new(vec!["hi", "a"]);
        let bin = msg.to_binary();
        assert_eq!(
            bin.as_ref(),
            &[0, 0, 0, 2, 0, 0, 0, 2, b'h', b'i', 0, 0, 0, 1, b'a']
        );
        assert_eq!(Message::from_binary(&bin).unwrap(), msg);
    }

    #[test]
    fn test_from_binary_truncated() {
        assert!(Message::from_binary(&[0, 0]).is_err());
        assert!(Message::from_binary(&[0, 0, 0, 1, 0, 0, 0, 5, b'x']).is_err());
    }
}
