//! Canonical node encoding
//!
//! ```text
//! count                       varint
//! token * count
//!   0 Leaf     len varint + codec bytes
//!   1 BackRef  varint index of an earlier inline leaf in this node
//!   2 Child    32 raw fingerprint bytes
//! ```
//!
//! Integers use bincode's varint encoding. A count-prefixed stream of tokens is
//! exactly bincode's encoding of a `Vec<Token>`, which is how it is decoded.

use super::context::{DecodeContext, EncodeContext};
use crate::model::Fingerprint;
use crate::{Error, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
enum Token<'a> {
    Leaf(#[serde(borrow)] &'a [u8]),
    BackRef(u32),
    Child([u8; 32]),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
}

/// One decoded entry: the codec bytes of a leaf, or a child fingerprint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodedEntry<'a> {
    Leaf(&'a [u8]),
    Child(Fingerprint),
}

/// Incremental encoder for one node's direct contents
///
/// Owns a fresh serialization context, so encoders never share state.
pub struct NodeEncoder {
    buf: Vec<u8>,
    ctx: EncodeContext,
    remaining: usize,
}

impl NodeEncoder {
    /// Start an encoding for a node with `count` entries
    pub fn new(count: usize) -> Result<Self> {
        let mut buf = Vec::with_capacity(16 + count * 8);
        options().serialize_into(&mut buf, &(count as u64))?;
        Ok(NodeEncoder {
            buf,
            ctx: EncodeContext::new(),
            remaining: count,
        })
    }

    /// Append a leaf given its codec bytes
    pub fn push_leaf(&mut self, encoded: &[u8]) -> Result<()> {
        let token = match self.ctx.back_reference(encoded) {
            Some(index) => Token::BackRef(index),
            None => Token::Leaf(encoded),
        };
        self.push(&token)
    }

    /// Append a child reference
    pub fn push_child(&mut self, fingerprint: &Fingerprint) -> Result<()> {
        self.push(&Token::Child(*fingerprint.as_bytes()))
    }

    fn push(&mut self, token: &Token<'_>) -> Result<()> {
        if self.remaining == 0 {
            return Err(Error::Codec("more entries than announced".into()));
        }
        options().serialize_into(&mut self.buf, token)?;
        self.remaining -= 1;
        Ok(())
    }

    /// Finish and return the encoded buffer
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.remaining != 0 {
            return Err(Error::Codec(format!(
                "{} announced entries were never written",
                self.remaining
            )));
        }
        Ok(self.buf)
    }
}

/// Decode a node encoding into its entries, in order
pub fn decode_contents(encoding: &[u8]) -> Result<Vec<DecodedEntry<'_>>> {
    let tokens: Vec<Token<'_>> = options()
        .deserialize(encoding)
        .map_err(|e| Error::Corruption(format!("malformed node encoding: {}", e)))?;

    let mut ctx = DecodeContext::new();
    tokens
        .into_iter()
        .map(|token| match token {
            Token::Leaf(bytes) => {
                ctx.record(bytes);
                Ok(DecodedEntry::Leaf(bytes))
            }
            Token::BackRef(index) => ctx.resolve(index).map(DecodedEntry::Leaf).ok_or_else(|| {
                Error::Corruption(format!("back-reference {} out of range", index))
            }),
            Token::Child(bytes) => Ok(DecodedEntry::Child(Fingerprint::from_bytes(bytes))),
        })
        .collect()
}
