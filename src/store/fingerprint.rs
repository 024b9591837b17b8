//! Fingerprinting: encode, hash and persist nodes bottom-up

use super::{FingerprintResult, NestedSetStore, WriteFuture};
use crate::cache::{ResultSlot, ResultSlotCell};
use crate::codec::LeafCodec;
use crate::encoding::{frame, NodeEncoder};
use crate::model::{Entry, Fingerprint, Node, NodeId};
use crate::Result;
use bytes::Bytes;
use futures::future::{self, FutureExt};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

impl<C: LeafCodec> NestedSetStore<C> {
    /// Fingerprint a node and schedule the write of every node not yet stored
    ///
    /// Returns as soon as the fingerprint is known; writes continue in the
    /// background and are tracked by the result's write future. A node object
    /// that was fingerprinted before is served from the backward cache without
    /// re-hashing or re-writing. Concurrent calls on the same object share one
    /// computation.
    pub fn fingerprint_and_store(&self, node: &Node<C::Leaf>) -> Result<FingerprintResult> {
        let slot = self.inner.cache.backward_slot(node);
        let outcome = slot.get_or_init(|| self.compute_and_store(node, &slot)).clone();
        if outcome.is_err() {
            self.inner.cache.forget_backward(node.id(), &slot);
        }
        outcome
    }

    /// Fingerprint a node and wait until it is durable
    pub async fn store(&self, node: &Node<C::Leaf>) -> Result<Fingerprint> {
        let result = self.fingerprint_and_store(node)?;
        result.wait_durable().await?;
        Ok(result.fingerprint())
    }

    fn compute_and_store(
        &self,
        node: &Node<C::Leaf>,
        slot: &ResultSlot,
    ) -> Result<FingerprintResult> {
        let mut encoder = NodeEncoder::new(node.len())?;
        let mut child_writes = Vec::new();
        let mut scratch = Vec::new();

        for entry in node.entries() {
            match entry {
                Entry::Leaf(leaf) => {
                    scratch.clear();
                    self.inner.codec.encode(leaf, &mut scratch)?;
                    encoder.push_leaf(&scratch)?;
                }
                Entry::Child(child) => {
                    let child_result = self.fingerprint_and_store(child)?;
                    encoder.push_child(&child_result.fingerprint())?;
                    child_writes.push(child_result.write_future());
                }
            }
        }

        let encoding = encoder.finish()?;
        let fingerprint = Fingerprint::digest(&encoding);
        let payload = frame::seal(&encoding, &self.inner.config)?;

        debug!(
            fingerprint = %fingerprint.short(),
            entries = node.len(),
            bytes = encoding.len(),
            stored = payload.len(),
            "fingerprinted node"
        );

        let write = self.schedule_write(
            node.id(),
            Arc::downgrade(slot),
            fingerprint,
            payload,
            child_writes,
        );
        self.inner.cache.record_forward(fingerprint, node);
        Ok(FingerprintResult::new(fingerprint, write))
    }

    /// Spawn the put for one node, joined with its children's write futures
    fn schedule_write(
        &self,
        id: NodeId,
        slot: Weak<ResultSlotCell>,
        fingerprint: Fingerprint,
        payload: Bytes,
        children: Vec<WriteFuture>,
    ) -> WriteFuture {
        let endpoint = Arc::clone(&self.inner.endpoint);
        let cache = Arc::downgrade(&self.inner.cache);
        self.inner.cache.note_put();

        let task = self.inner.runtime.spawn(async move {
            let own = endpoint.put(fingerprint, payload).await;
            let children = future::try_join_all(children).await.map(|_| ());
            let outcome = own.and(children);

            if let Err(e) = &outcome {
                warn!(fingerprint = %fingerprint.short(), error = %e, "node write failed");
                // A retry must re-issue the write instead of reusing this failure.
                // The slot may not be filled yet, so match it by identity.
                if let (Some(cache), Some(slot)) = (cache.upgrade(), slot.upgrade()) {
                    cache.forget_backward(id, &slot);
                }
            }
            outcome
        });

        async move { task.await? }.boxed().shared()
    }
}
