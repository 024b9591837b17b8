//! Storage endpoints
//!
//! The store persists node frames through a [`StorageEndpoint`]: an async
//! `put`/`get` backend keyed by fingerprint. Any backend works, in memory, on
//! disk, or behind a remote service.

mod file;
mod memory;
mod traits;

pub use file::FileEndpoint;
pub use memory::MemoryEndpoint;
pub use traits::StorageEndpoint;
