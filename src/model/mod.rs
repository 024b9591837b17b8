//! Data model types for nestset

mod fingerprint;
mod node;

pub use fingerprint::Fingerprint;
pub(crate) use node::WeakNode;
pub use node::{Entry, Node, NodeId};
