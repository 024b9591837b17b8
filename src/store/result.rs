//! Fingerprint results and durability futures

use crate::model::Fingerprint;
use crate::Result;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::fmt;

/// Resolves once a node and every child it depends on were accepted by the
/// storage endpoint
///
/// Cloning is cheap and every clone observes the same outcome. Dropping it
/// does not cancel the underlying writes.
pub type WriteFuture = Shared<BoxFuture<'static, Result<()>>>;

/// A node's fingerprint paired with its durability future
#[derive(Clone)]
pub struct FingerprintResult {
    fingerprint: Fingerprint,
    write: WriteFuture,
}

impl FingerprintResult {
    pub(crate) fn new(fingerprint: Fingerprint, write: WriteFuture) -> Self {
        FingerprintResult { fingerprint, write }
    }

    /// A result for a node already known to be durable
    pub(crate) fn durable(fingerprint: Fingerprint) -> Self {
        FingerprintResult {
            fingerprint,
            write: future::ready(Ok(())).boxed().shared(),
        }
    }

    /// The node's fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// A handle on the durability future
    pub fn write_future(&self) -> WriteFuture {
        self.write.clone()
    }

    /// Wait until the node and all its children are durable
    pub async fn wait_durable(&self) -> Result<()> {
        self.write.clone().await
    }

    /// Whether the durability future has already completed, and how
    pub fn durability(&self) -> Option<Result<()>> {
        self.write.peek().cloned()
    }
}

impl fmt::Debug for FingerprintResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintResult")
            .field("fingerprint", &self.fingerprint)
            .field("durable", &self.durability().map(|r| r.is_ok()))
            .finish()
    }
}
