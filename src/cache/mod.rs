//! In-process node caches
//!
//! Two tables accelerate the store, and neither is ever the source of truth:
//!
//! - **forward**: fingerprint → decoded node, either ready or still being
//!   fetched. Concurrent resolves of one fingerprint share the pending fetch.
//! - **backward**: node identity → fingerprint result. Lets re-fingerprinting
//!   the same object skip hashing, encoding and writing.
//!
//! Both tables hold nodes weakly. Entries whose node has been dropped are
//! misses, and are swept once a table grows past its purge threshold. All
//! critical sections are pure in-memory work; no lock is held across an await
//! point or a recursive call.

mod stats;

pub use stats::CacheStats;

use crate::model::{Fingerprint, Node, NodeId, WeakNode};
use crate::store::FingerprintResult;
use crate::Result;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use stats::StatsCounters;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// A fetch shared by every concurrent resolver of one fingerprint
pub type SharedNode<L> = Shared<BoxFuture<'static, Result<Node<L>>>>;

/// Once-cell holding the outcome of fingerprinting one node object
pub(crate) type ResultSlotCell = OnceLock<Result<FingerprintResult>>;

/// Shared handle on a [`ResultSlotCell`]; its address identifies the entry
pub(crate) type ResultSlot = Arc<ResultSlotCell>;

/// Forward cache lookup outcome
pub enum ForwardHit<L> {
    /// Contents are in memory
    Ready(Node<L>),
    /// A fetch is in flight
    Pending(SharedNode<L>),
}

enum ForwardSlot<L> {
    Pending(SharedNode<L>),
    Ready(WeakNode<L>),
}

impl<L> ForwardSlot<L> {
    fn hit(&self) -> Option<ForwardHit<L>> {
        match self {
            ForwardSlot::Pending(fetch) => Some(ForwardHit::Pending(fetch.clone())),
            ForwardSlot::Ready(node) => node.upgrade().map(ForwardHit::Ready),
        }
    }
}

struct BackwardEntry<L> {
    // Keeps the allocation, and with it the `NodeId` key, from being reused
    node: WeakNode<L>,
    slot: ResultSlot,
}

trait Liveness {
    fn is_live(&self) -> bool;
}

impl<L> Liveness for ForwardSlot<L> {
    fn is_live(&self) -> bool {
        match self {
            // Nobody but the table holds a fetch that was dropped unpolled
            ForwardSlot::Pending(fetch) => fetch.strong_count().is_some_and(|n| n > 1),
            ForwardSlot::Ready(node) => node.is_live(),
        }
    }
}

impl<L> Liveness for BackwardEntry<L> {
    fn is_live(&self) -> bool {
        self.node.is_live()
    }
}

/// A map that sweeps dead entries when it outgrows its threshold
struct Table<K, V> {
    map: HashMap<K, V>,
    base_threshold: usize,
    purge_at: usize,
}

impl<K: Eq + Hash, V: Liveness> Table<K, V> {
    fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Table {
            map: HashMap::new(),
            base_threshold: threshold,
            purge_at: threshold,
        }
    }

    /// Insert, then sweep if the table has grown too large
    fn insert(&mut self, key: K, value: V) -> usize {
        self.map.insert(key, value);
        if self.map.len() >= self.purge_at {
            self.purge()
        } else {
            0
        }
    }

    fn purge(&mut self) -> usize {
        let before = self.map.len();
        self.map.retain(|_, v| v.is_live());
        self.purge_at = self.base_threshold.max(self.map.len() * 2);
        before - self.map.len()
    }
}

/// The forward and backward caches of one store
pub struct NodeCache<L> {
    forward: Mutex<Table<Fingerprint, ForwardSlot<L>>>,
    backward: Mutex<Table<NodeId, BackwardEntry<L>>>,
    stats: StatsCounters,
}

impl<L> NodeCache<L> {
    /// Create a cache that sweeps a table once it reaches `purge_threshold`
    pub fn new(purge_threshold: usize) -> Self {
        NodeCache {
            forward: Mutex::new(Table::new(purge_threshold)),
            backward: Mutex::new(Table::new(purge_threshold)),
            stats: StatsCounters::default(),
        }
    }

    // === Backward cache ===

    /// Cached fingerprint result for this exact node object
    pub fn lookup_backward(&self, node: &Node<L>) -> Option<FingerprintResult> {
        let hit = self
            .backward
            .lock()
            .map
            .get(&node.id())
            .and_then(|entry| entry.slot.get())
            .and_then(|outcome| outcome.as_ref().ok().cloned());
        self.stats.backward(hit.is_some());
        hit
    }

    /// Record a fingerprint result for a node object
    ///
    /// An entry that already holds a result is kept.
    pub fn record_backward(&self, node: &Node<L>, result: FingerprintResult) {
        let mut table = self.backward.lock();
        if let Some(entry) = table.map.get(&node.id()) {
            if entry.slot.get().is_some() {
                return;
            }
        }
        let purged = table.insert(
            node.id(),
            BackwardEntry {
                node: node.downgrade(),
                slot: Arc::new(OnceLock::from(Ok(result))),
            },
        );
        drop(table);
        self.note_purged(purged);
    }

    /// The result slot for a node, inserting an empty one if absent
    ///
    /// Atomic: concurrent callers for the same object get the same slot.
    pub(crate) fn backward_slot(&self, node: &Node<L>) -> ResultSlot {
        let mut table = self.backward.lock();
        if let Some(entry) = table.map.get(&node.id()) {
            let slot = Arc::clone(&entry.slot);
            drop(table);
            self.stats.backward(slot.get().is_some());
            return slot;
        }

        let slot: ResultSlot = Arc::new(OnceLock::new());
        let purged = table.insert(
            node.id(),
            BackwardEntry {
                node: node.downgrade(),
                slot: Arc::clone(&slot),
            },
        );
        drop(table);
        self.stats.backward(false);
        self.note_purged(purged);
        slot
    }

    /// Drop a node's entry if it still holds `slot`
    pub(crate) fn forget_backward(&self, id: NodeId, slot: &ResultSlot) {
        let mut table = self.backward.lock();
        if table
            .map
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.slot, slot))
        {
            table.map.remove(&id);
        }
    }

    // === Forward cache ===

    /// Cached contents (ready or in flight) for a fingerprint
    pub fn lookup_forward(&self, fingerprint: &Fingerprint) -> Option<ForwardHit<L>> {
        let hit = self
            .forward
            .lock()
            .map
            .get(fingerprint)
            .and_then(ForwardSlot::hit);
        self.stats.forward(hit.is_some());
        hit
    }

    /// Record contents known to match a fingerprint
    pub fn record_forward(&self, fingerprint: Fingerprint, node: &Node<L>) {
        let purged = self
            .forward
            .lock()
            .insert(fingerprint, ForwardSlot::Ready(node.downgrade()));
        self.note_purged(purged);
    }

    /// Cached contents for a fingerprint, or register the fetch built by `make`
    ///
    /// Atomic: of several concurrent callers, exactly one fetch is registered
    /// and every caller receives it. `make` runs under the lock and must not
    /// poll anything.
    pub(crate) fn forward_or_insert(
        &self,
        fingerprint: Fingerprint,
        make: impl FnOnce() -> SharedNode<L>,
    ) -> ForwardHit<L> {
        let mut table = self.forward.lock();
        if let Some(hit) = table.map.get(&fingerprint).and_then(ForwardSlot::hit) {
            drop(table);
            self.stats.forward(true);
            return hit;
        }

        let fetch = make();
        let purged = table.insert(fingerprint, ForwardSlot::Pending(fetch.clone()));
        drop(table);
        self.stats.forward(false);
        self.note_purged(purged);
        trace!(fingerprint = %fingerprint.short(), "registered fetch");
        ForwardHit::Pending(fetch)
    }

    /// Drop a fingerprint's entry if it is still an in-flight fetch
    pub(crate) fn forget_pending_forward(&self, fingerprint: &Fingerprint) {
        let mut table = self.forward.lock();
        if matches!(table.map.get(fingerprint), Some(ForwardSlot::Pending(_))) {
            table.map.remove(fingerprint);
        }
    }

    // === Maintenance ===

    /// Sweep dead entries from both tables, returning how many were removed
    pub fn purge(&self) -> usize {
        let purged = self.forward.lock().purge() + self.backward.lock().purge();
        self.note_purged(purged);
        purged
    }

    /// Number of forward entries, live or not
    pub fn forward_len(&self) -> usize {
        self.forward.lock().map.len()
    }

    /// Number of backward entries, live or not
    pub fn backward_len(&self) -> usize {
        self.backward.lock().map.len()
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub(crate) fn note_put(&self) {
        self.stats.put_issued();
    }

    fn note_purged(&self, purged: usize) {
        if purged > 0 {
            trace!(purged, "swept dead cache entries");
            self.stats.purged(purged);
        }
    }
}
