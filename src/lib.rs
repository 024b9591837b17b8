//! # nestset
//!
//! A content-addressed store for recursively shared nested sets.
//!
//! Build graphs produce huge, highly overlapping "sets of sets" (all transitive
//! headers of a target, all runtime files of a binary). nestset fingerprints
//! such a DAG bottom-up, stores every distinct node exactly once no matter how
//! many parents reference it, and reconstructs any node from its fingerprint.
//!
//! ## Core Concepts
//!
//! - **Nodes**: immutable ordered sequences of leaves and child nodes
//! - **Fingerprints**: BLAKE3 hashes of a node's canonical encoding, where a
//!   child is encoded as its fingerprint
//! - **Storage endpoints**: pluggable async key-value backends
//! - **Node cache**: weak, identity-keyed accelerators that skip re-hashing
//!   and coalesce concurrent fetches
//!
//! ## Example
//!
//! ```ignore
//! use nestset::{Entry, JsonCodec, NestedSetStore, Node};
//!
//! let store = NestedSetStore::in_memory(JsonCodec::<String>::new())?;
//! let headers = Node::from_leaves(["a.h".to_string(), "b.h".to_string()]);
//! let target = Node::new(vec![Entry::leaf("main.c".to_string()), Entry::child(&headers)]);
//!
//! let result = store.fingerprint_and_store(&target)?;
//! result.wait_durable().await?;
//! let restored = store.resolve(result.fingerprint()).await?;
//! assert_eq!(restored, target);
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod endpoint;
pub mod model;
pub mod store;

mod error;

pub use cache::{CacheStats, NodeCache};
pub use codec::{BincodeCodec, JsonCodec, LeafCodec};
pub use config::StoreConfig;
pub use endpoint::{FileEndpoint, MemoryEndpoint, StorageEndpoint};
pub use error::{Error, Result};
pub use model::{Entry, Fingerprint, Node, NodeId};
pub use store::{FingerprintResult, NestedSetStore, WriteFuture};

/// Store file version for format compatibility
pub const VERSION: u32 = 1;

/// Magic bytes for store file identification
pub const MAGIC: &[u8; 8] = b"NESTSET\0";
