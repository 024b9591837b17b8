//! Storage frames - the unit handed to a storage endpoint
//!
//! ```text
//! [frame byte: 1][body]
//!   0 Raw   body is the node encoding
//!   1 Zstd  body is the zstd-compressed node encoding
//! ```
//!
//! Fingerprints are computed over the node encoding, never over the frame, so
//! compression settings do not change any fingerprint.

use crate::config::StoreConfig;
use crate::{Error, Result};
use bytes::Bytes;
use std::borrow::Cow;

/// Type tag for frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Raw,
    Zstd,
}

impl FrameKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            FrameKind::Raw => 0,
            FrameKind::Zstd => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(FrameKind::Raw),
            1 => Some(FrameKind::Zstd),
            _ => None,
        }
    }
}

/// Wrap a node encoding for storage, compressing it if the config asks for it
pub fn seal(encoding: &[u8], config: &StoreConfig) -> Result<Bytes> {
    let level = config
        .compression_level
        .filter(|_| encoding.len() >= config.compression_min_bytes);

    let mut output = Vec::with_capacity(encoding.len() + 1);
    match level {
        Some(level) => {
            output.push(FrameKind::Zstd.as_byte());
            let compressed = zstd::encode_all(encoding, level)?;
            output.extend(compressed);
        }
        None => {
            output.push(FrameKind::Raw.as_byte());
            output.extend_from_slice(encoding);
        }
    }
    Ok(Bytes::from(output))
}

/// Recover the node encoding from a stored frame
pub fn open(data: &[u8]) -> Result<Cow<'_, [u8]>> {
    let (&tag, body) = data
        .split_first()
        .ok_or_else(|| Error::Corruption("Empty frame".into()))?;

    let kind = FrameKind::from_byte(tag)
        .ok_or_else(|| Error::Corruption(format!("Invalid frame type: {}", tag)))?;

    match kind {
        FrameKind::Raw => Ok(Cow::Borrowed(body)),
        FrameKind::Zstd => Ok(Cow::Owned(zstd::decode_all(body)?)),
    }
}
