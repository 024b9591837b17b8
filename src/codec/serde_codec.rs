//! Codecs for any serde type

use super::LeafCodec;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Encodes leaves as JSON
///
/// Works for self-describing values such as `serde_json::Value`, which the CLI
/// uses for arbitrary documents.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        JsonCodec {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> LeafCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Leaf = T;

    fn encode(&self, leaf: &T, out: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(out, leaf)?;
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(input)?)
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// Encodes leaves with bincode
///
/// Compact, but only for types that do not rely on `deserialize_any`.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        BincodeCodec {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BincodeCodec")
    }
}

impl<T> LeafCodec for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Leaf = T;

    fn encode(&self, leaf: &T, out: &mut Vec<u8>) -> Result<()> {
        bincode::serialize_into(out, leaf)?;
        Ok(())
    }

    fn decode(&self, input: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(input)?)
    }

    fn name(&self) -> &str {
        "bincode"
    }
}
