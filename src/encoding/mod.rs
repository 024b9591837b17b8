//! Node encodings and storage frames
//!
//! A node is encoded as its entry count followed by one token per entry. Leaf
//! tokens carry the leaf codec's bytes; child tokens carry the child's
//! fingerprint, so a shared child is stored once no matter how many parents
//! reference it.

mod context;
pub mod frame;
mod node;

pub use node::{decode_contents, DecodedEntry, NodeEncoder};
