//! The nested set store
//!
//! [`NestedSetStore`] ties a storage endpoint, a leaf codec and a node cache
//! together. It fingerprints nodes bottom-up, persisting each distinct node
//! once, and resolves fingerprints top-down back into nodes.
//!
//! A store is a cheap handle: clones share the same endpoint and caches.
//! Nothing here is process-global, so independent stores never observe each
//! other's cache state.

mod fingerprint;
mod resolve;
mod result;

pub use result::{FingerprintResult, WriteFuture};

use crate::cache::{CacheStats, NodeCache};
use crate::codec::LeafCodec;
use crate::config::StoreConfig;
use crate::endpoint::{MemoryEndpoint, StorageEndpoint};
use crate::{Error, Result};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;

struct Inner<C: LeafCodec> {
    endpoint: Arc<dyn StorageEndpoint>,
    codec: C,
    cache: Arc<NodeCache<C::Leaf>>,
    config: StoreConfig,
    /// Runtime that write tasks are spawned on
    runtime: Handle,
}

/// Content-addressed store for nested sets
pub struct NestedSetStore<C: LeafCodec> {
    inner: Arc<Inner<C>>,
}

impl<C: LeafCodec> Clone for NestedSetStore<C> {
    fn clone(&self) -> Self {
        NestedSetStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: LeafCodec> NestedSetStore<C> {
    /// Create a store with the default config on the current tokio runtime
    pub fn new(endpoint: Arc<dyn StorageEndpoint>, codec: C) -> Result<Self> {
        Self::with_config(endpoint, codec, StoreConfig::default())
    }

    /// Create a store on the current tokio runtime
    ///
    /// Fails with [`Error::Runtime`] when called outside a runtime; use
    /// [`with_runtime`](Self::with_runtime) to pass a handle explicitly.
    pub fn with_config(
        endpoint: Arc<dyn StorageEndpoint>,
        codec: C,
        config: StoreConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(endpoint, codec, config, runtime))
    }

    /// Create a store that spawns its writes on `runtime`
    pub fn with_runtime(
        endpoint: Arc<dyn StorageEndpoint>,
        codec: C,
        config: StoreConfig,
        runtime: Handle,
    ) -> Self {
        let cache = Arc::new(NodeCache::new(config.cache_purge_threshold));
        NestedSetStore {
            inner: Arc::new(Inner {
                endpoint,
                codec,
                cache,
                config,
                runtime,
            }),
        }
    }

    /// Create a store backed by a fresh [`MemoryEndpoint`]
    pub fn in_memory(codec: C) -> Result<Self> {
        Self::new(Arc::new(MemoryEndpoint::new()), codec)
    }

    /// The storage endpoint
    pub fn endpoint(&self) -> &Arc<dyn StorageEndpoint> {
        &self.inner.endpoint
    }

    /// The leaf codec
    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// The store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The node cache
    pub fn cache(&self) -> &NodeCache<C::Leaf> {
        &self.inner.cache
    }

    /// Snapshot of the cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    fn upgrade(weak: &Weak<Inner<C>>) -> Result<Self> {
        weak.upgrade()
            .map(|inner| NestedSetStore { inner })
            .ok_or_else(|| Error::Runtime("store was dropped".into()))
    }
}
