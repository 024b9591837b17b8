//! Reconstruction: fetch and expand nodes top-down

use super::{FingerprintResult, Inner, NestedSetStore};
use crate::cache::{ForwardHit, SharedNode};
use crate::codec::LeafCodec;
use crate::encoding::{decode_contents, frame, DecodedEntry};
use crate::model::{Entry, Fingerprint, Node};
use crate::{Error, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Placeholder for one entry while children are still being resolved
enum Slot<L> {
    Leaf(L),
    Child,
}

type Decoded<L> = (Vec<Slot<L>>, Vec<BoxFuture<'static, Result<Node<L>>>>);

impl<C: LeafCodec> NestedSetStore<C> {
    /// Reconstruct the node stored under `fingerprint`
    ///
    /// Nodes already in memory resolve immediately. Concurrent resolves of one
    /// fingerprint share a single backend fetch. A fingerprint the endpoint has
    /// never seen fails with [`Error::NotFound`]; the lookup is not retried.
    pub fn resolve(&self, fingerprint: Fingerprint) -> BoxFuture<'static, Result<Node<C::Leaf>>> {
        match self
            .inner
            .cache
            .forward_or_insert(fingerprint, || self.fetch(fingerprint))
        {
            ForwardHit::Ready(node) => future::ready(Ok(node)).boxed(),
            ForwardHit::Pending(fetch) => fetch.boxed(),
        }
    }

    /// Build the shared fetch registered in the forward cache
    ///
    /// Holds the store weakly, since the cache that owns this future lives in
    /// the store.
    fn fetch(&self, fingerprint: Fingerprint) -> SharedNode<C::Leaf> {
        let weak = Arc::downgrade(&self.inner);
        async move {
            let outcome = Self::fetch_uncached(&weak, fingerprint).await;

            if let Ok(store) = Self::upgrade(&weak) {
                let cache = &store.inner.cache;
                match &outcome {
                    Ok(node) => {
                        cache.record_forward(fingerprint, node);
                        cache.record_backward(node, FingerprintResult::durable(fingerprint));
                    }
                    Err(e) => {
                        debug!(fingerprint = %fingerprint.short(), error = %e, "resolve failed");
                        cache.forget_pending_forward(&fingerprint);
                    }
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }

    async fn fetch_uncached(
        weak: &Weak<Inner<C>>,
        fingerprint: Fingerprint,
    ) -> Result<Node<C::Leaf>> {
        let endpoint = Arc::clone(&Self::upgrade(weak)?.inner.endpoint);
        let payload = endpoint
            .get(fingerprint)
            .await?
            .ok_or(Error::NotFound(fingerprint))?;

        let (slots, children) = Self::upgrade(weak)?.decode_payload(fingerprint, &payload)?;
        let mut resolved = future::try_join_all(children).await?.into_iter();

        let entries = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Leaf(leaf) => Ok(Entry::Leaf(leaf)),
                Slot::Child => resolved.next().map(Entry::Child).ok_or_else(|| {
                    Error::Corruption(format!("{}: child count mismatch", fingerprint))
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Node::new(entries))
    }

    /// Decode leaves in place and start resolving every child, in order
    fn decode_payload(&self, fingerprint: Fingerprint, payload: &[u8]) -> Result<Decoded<C::Leaf>> {
        let encoding = frame::open(payload)?;

        if self.inner.config.verify_reads {
            let actual = Fingerprint::digest(&encoding);
            if actual != fingerprint {
                warn!(
                    expected = %fingerprint,
                    actual = %actual,
                    "fetched object does not match its fingerprint"
                );
                return Err(Error::FingerprintMismatch {
                    expected: fingerprint,
                    actual,
                });
            }
        }

        let mut slots = Vec::new();
        let mut children = Vec::new();
        for entry in decode_contents(&encoding)? {
            match entry {
                DecodedEntry::Leaf(bytes) => {
                    slots.push(Slot::Leaf(self.inner.codec.decode(bytes)?));
                }
                DecodedEntry::Child(child) => {
                    slots.push(Slot::Child);
                    children.push(self.resolve(child));
                }
            }
        }
        Ok((slots, children))
    }
}
