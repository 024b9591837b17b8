//! Per-node serialization contexts
//!
//! A context memoizes leaf encodings within one node so a repeated leaf is
//! written once and back-referenced afterwards. Contexts never outlive a single
//! node encode or decode: a leaf's bytes must not depend on anything serialized
//! earlier in the same tree walk.

use std::collections::HashMap;

/// Memo table used while encoding one node
#[derive(Debug, Default)]
pub(crate) struct EncodeContext {
    memo: HashMap<Vec<u8>, u32>,
}

impl EncodeContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Index of an earlier identical leaf, or record this one and return `None`
    pub(crate) fn back_reference(&mut self, encoded: &[u8]) -> Option<u32> {
        if let Some(&index) = self.memo.get(encoded) {
            return Some(index);
        }
        let index = self.memo.len() as u32;
        self.memo.insert(encoded.to_vec(), index);
        None
    }
}

/// Mirror of [`EncodeContext`] used while decoding one node
#[derive(Debug, Default)]
pub(crate) struct DecodeContext<'a> {
    memo: Vec<&'a [u8]>,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, encoded: &'a [u8]) {
        self.memo.push(encoded);
    }

    pub(crate) fn resolve(&self, index: u32) -> Option<&'a [u8]> {
        self.memo.get(index as usize).copied()
    }
}
