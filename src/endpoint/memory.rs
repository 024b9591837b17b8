//! In-memory storage endpoint

use super::StorageEndpoint;
use crate::model::Fingerprint;
use crate::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// Endpoint backed by a `RwLock<HashMap>`
///
/// Counts every call, per fingerprint for writes, so tests can assert how
/// much work reached the backend.
#[derive(Default)]
pub struct MemoryEndpoint {
    objects: RwLock<HashMap<Fingerprint, Bytes>>,
    puts_per_key: RwLock<HashMap<Fingerprint, usize>>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `put` calls received
    pub fn put_count(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Total `get` calls received
    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// `put` calls received for one fingerprint
    pub fn puts_for(&self, fingerprint: &Fingerprint) -> usize {
        self.puts_per_key
            .read()
            .get(fingerprint)
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct objects stored
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Check if a fingerprint is stored
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.objects.read().contains_key(fingerprint)
    }

    /// Stored payload for a fingerprint, without counting a `get`
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        self.objects.read().get(fingerprint).cloned()
    }

    /// Drop a stored object, simulating backend data loss
    pub fn remove(&self, fingerprint: &Fingerprint) -> Option<Bytes> {
        self.objects.write().remove(fingerprint)
    }

    /// Overwrite a stored payload, simulating corruption
    pub fn overwrite(&self, fingerprint: Fingerprint, data: Bytes) {
        self.objects.write().insert(fingerprint, data);
    }
}

#[async_trait::async_trait]
impl StorageEndpoint for MemoryEndpoint {
    async fn put(&self, fingerprint: Fingerprint, data: Bytes) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        *self.puts_per_key.write().entry(fingerprint).or_insert(0) += 1;

        trace!(fingerprint = %fingerprint.short(), size = data.len(), "storing object in memory");
        self.objects.write().insert(fingerprint, data);
        Ok(())
    }

    async fn get(&self, fingerprint: Fingerprint) -> Result<Option<Bytes>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.read().get(&fingerprint).cloned())
    }
}
