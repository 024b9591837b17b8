//! Leaf value codecs
//!
//! The store never interprets leaf values. A [`LeafCodec`] turns each leaf into
//! bytes and back; the store frames those bytes inside its own node encoding,
//! so a codec never has to tell leaves apart from child fingerprints.

mod serde_codec;

pub use serde_codec::{BincodeCodec, JsonCodec};

use crate::Result;

/// Trait for encoding and decoding leaf values
///
/// Implementations must be deterministic: the same leaf value must always
/// encode to the same bytes, or identical nodes would fingerprint differently.
pub trait LeafCodec: Send + Sync + 'static {
    /// The leaf value type
    type Leaf: Send + Sync + 'static;

    /// Append the encoding of `leaf` to `out`
    fn encode(&self, leaf: &Self::Leaf, out: &mut Vec<u8>) -> Result<()>;

    /// Decode one leaf from exactly the bytes `encode` produced
    fn decode(&self, input: &[u8]) -> Result<Self::Leaf>;

    /// Get the codec name/identifier
    fn name(&self) -> &str;
}
