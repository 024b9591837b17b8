//! Store Integration Tests
//!
//! Exercise fingerprinting, persistence and reconstruction through the public
//! API, against in-memory, on-disk and deliberately misbehaving endpoints.
//!
//! Run with:
//! ```bash
//! cargo test --test store_integration
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use nestset::encoding::frame;
use nestset::{
    Entry, Error, FileEndpoint, Fingerprint, JsonCodec, LeafCodec, MemoryEndpoint, NestedSetStore,
    Node, Result, StorageEndpoint, StoreConfig,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

type StringStore = NestedSetStore<JsonCodec<String>>;

fn leaf(s: &str) -> Entry<String> {
    Entry::leaf(s.to_string())
}

fn leaves(items: &[&str]) -> Node<String> {
    Node::from_leaves(items.iter().map(|s| s.to_string()))
}

fn raw_config() -> StoreConfig {
    StoreConfig::default().without_compression()
}

fn memory_store(config: StoreConfig) -> (StringStore, Arc<MemoryEndpoint>) {
    let endpoint = Arc::new(MemoryEndpoint::new());
    let store = NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), config).unwrap();
    (store, endpoint)
}

/// A = [x, B], B = [y, z]
fn example_graph() -> (Node<String>, Node<String>) {
    let b = leaves(&["y", "z"]);
    let a = Node::new(vec![leaf("x"), Entry::child(&b)]);
    (a, b)
}

// ============================================================================
// Test endpoints
// ============================================================================

/// Delays every call so concurrent requests overlap
struct SlowEndpoint {
    inner: Arc<MemoryEndpoint>,
    delay: Duration,
}

#[async_trait]
impl StorageEndpoint for SlowEndpoint {
    async fn put(&self, fingerprint: Fingerprint, data: Bytes) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.put(fingerprint, data).await
    }

    async fn get(&self, fingerprint: Fingerprint) -> Result<Option<Bytes>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(fingerprint).await
    }
}

/// Rejects writes while `failing` is set
struct FlakyEndpoint {
    inner: MemoryEndpoint,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl FlakyEndpoint {
    fn new(failing: bool) -> Self {
        FlakyEndpoint {
            inner: MemoryEndpoint::new(),
            failing: AtomicBool::new(failing),
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StorageEndpoint for FlakyEndpoint {
    async fn put(&self, fingerprint: Fingerprint, data: Bytes) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Endpoint("backend unavailable".into()));
        }
        self.inner.put(fingerprint, data).await
    }

    async fn get(&self, fingerprint: Fingerprint) -> Result<Option<Bytes>> {
        self.inner.get(fingerprint).await
    }
}

/// String codec that refuses one value
struct PickyCodec {
    rejected: &'static str,
}

impl LeafCodec for PickyCodec {
    type Leaf = String;

    fn encode(&self, leaf: &String, out: &mut Vec<u8>) -> Result<()> {
        if leaf == self.rejected {
            return Err(Error::Codec(format!("cannot encode '{}'", leaf)));
        }
        out.extend_from_slice(leaf.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Codec(e.to_string()))
    }

    fn name(&self) -> &str {
        "picky"
    }
}

// ============================================================================
// Fingerprinting
// ============================================================================

#[tokio::test]
async fn test_example_graph_layout() {
    let (store, endpoint) = memory_store(raw_config());
    let (a, b) = example_graph();

    let result = store.fingerprint_and_store(&a).unwrap();
    result.wait_durable().await.unwrap();

    let fp_b = store.fingerprint_and_store(&b).unwrap().fingerprint();
    assert_eq!(endpoint.put_count(), 2);

    let stored = endpoint.peek(&result.fingerprint()).unwrap();
    let encoding = frame::open(&stored).unwrap();

    let mut expected = vec![2, 0, 3, b'"', b'x', b'"', 2];
    expected.extend_from_slice(fp_b.as_bytes());
    assert_eq!(&*encoding, &expected[..]);
    assert_eq!(Fingerprint::digest(&expected), result.fingerprint());
}

#[tokio::test]
async fn test_fingerprints_are_deterministic_across_stores() {
    let (first, _) = memory_store(StoreConfig::default());
    let (second, _) = memory_store(raw_config());

    let (a1, _) = example_graph();
    let (a2, _) = example_graph();

    let fp1 = first.store(&a1).await.unwrap();
    let fp2 = second.store(&a2).await.unwrap();
    assert_eq!(fp1, fp2, "compression and node identity must not matter");
}

#[tokio::test]
async fn test_order_changes_fingerprint() {
    let (store, _) = memory_store(raw_config());
    let forward = store.store(&leaves(&["a", "b"])).await.unwrap();
    let reversed = store.store(&leaves(&["b", "a"])).await.unwrap();
    assert_ne!(forward, reversed);
}

#[tokio::test]
async fn test_shared_child_is_written_once() {
    let (store, endpoint) = memory_store(raw_config());
    let shared = leaves(&["a.h", "b.h"]);
    let targets: Vec<Node<String>> = ["lib.c", "main.c", "util.c"]
        .iter()
        .map(|src| Node::new(vec![leaf(src), Entry::child(&shared)]))
        .collect();
    let root = Node::new(targets.iter().map(Entry::child).collect());

    store.store(&root).await.unwrap();
    let fp_shared = store.fingerprint_and_store(&shared).unwrap().fingerprint();

    assert_eq!(endpoint.puts_for(&fp_shared), 1);
    assert_eq!(endpoint.put_count(), 5);
    assert_eq!(store.cache_stats().puts_issued, 5);
}

#[tokio::test]
async fn test_refingerprinting_same_object_is_cached() {
    let (store, endpoint) = memory_store(raw_config());
    let (a, _) = example_graph();

    let first = store.fingerprint_and_store(&a).unwrap();
    let second = store.fingerprint_and_store(&a).unwrap();
    assert_eq!(first.fingerprint(), second.fingerprint());

    second.wait_durable().await.unwrap();
    assert_eq!(endpoint.put_count(), 2);
}

#[tokio::test]
async fn test_equal_nodes_built_separately_share_a_fingerprint() {
    let (store, endpoint) = memory_store(raw_config());
    let one = store.store(&leaves(&["a", "b"])).await.unwrap();
    let two = store.store(&leaves(&["a", "b"])).await.unwrap();

    assert_eq!(one, two);
    assert_eq!(endpoint.len(), 1);
}

#[tokio::test]
async fn test_repeated_leaf_back_reference_is_per_node() {
    let (store, endpoint) = memory_store(raw_config());
    let inner = leaves(&["a"]);
    let outer = Node::new(vec![leaf("a"), leaf("a"), Entry::child(&inner)]);

    let fp_outer = store.store(&outer).await.unwrap();
    let fp_inner = store.fingerprint_and_store(&inner).unwrap().fingerprint();

    // the child starts with a fresh context and carries its leaf inline
    let inner_bytes = endpoint.peek(&fp_inner).unwrap();
    assert_eq!(&*frame::open(&inner_bytes).unwrap(), &[1, 0, 3, b'"', b'a', b'"']);

    let outer_bytes = endpoint.peek(&fp_outer).unwrap();
    let mut expected = vec![3, 0, 3, b'"', b'a', b'"', 1, 0, 2];
    expected.extend_from_slice(fp_inner.as_bytes());
    assert_eq!(&*frame::open(&outer_bytes).unwrap(), &expected[..]);

    let restored = store.resolve(fp_outer).await.unwrap();
    assert_eq!(restored, outer);
}

#[tokio::test]
async fn test_empty_node() {
    let (store, endpoint) = memory_store(raw_config());
    let fp = store.store(&Node::empty()).await.unwrap();

    assert_eq!(&*frame::open(&endpoint.peek(&fp).unwrap()).unwrap(), &[0]);

    let fresh: StringStore =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), raw_config()).unwrap();
    assert!(fresh.resolve(fp).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_result_still_writes() {
    let (store, endpoint) = memory_store(raw_config());
    let fp = store
        .fingerprint_and_store(&leaves(&["fire", "and", "forget"]))
        .unwrap()
        .fingerprint();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !endpoint.contains(&fp) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("write should land without anyone awaiting it");
}

// ============================================================================
// Failure propagation
// ============================================================================

#[tokio::test]
async fn test_codec_failure_propagates_without_writes() {
    let endpoint = Arc::new(MemoryEndpoint::new());
    let store =
        NestedSetStore::with_config(endpoint.clone(), PickyCodec { rejected: "bad" }, raw_config())
            .unwrap();

    let child = Node::from_leaves(["bad".to_string()]);
    let parent = Node::new(vec![Entry::leaf("good".to_string()), Entry::child(&child)]);

    let err = store.fingerprint_and_store(&parent).unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
    assert_eq!(endpoint.put_count(), 0);

    // failures are not cached
    assert!(store.fingerprint_and_store(&parent).is_err());
}

#[tokio::test]
async fn test_failed_write_reaches_ancestors_and_retries() {
    let endpoint = Arc::new(FlakyEndpoint::new(true));
    let store =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::<String>::new(), raw_config())
            .unwrap();
    let (a, b) = example_graph();

    let result = store.fingerprint_and_store(&a).unwrap();
    let err = result.wait_durable().await.unwrap_err();
    assert!(matches!(err, Error::Endpoint(_)));
    assert!(endpoint.inner.is_empty());

    endpoint.failing.store(false, Ordering::SeqCst);
    let retry = store.fingerprint_and_store(&a).unwrap();
    assert_eq!(retry.fingerprint(), result.fingerprint());
    retry.wait_durable().await.unwrap();

    let fp_b = store.fingerprint_and_store(&b).unwrap().fingerprint();
    assert!(endpoint.inner.contains(&result.fingerprint()));
    assert!(endpoint.inner.contains(&fp_b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_write_is_never_reused_across_threads() {
    let endpoint = Arc::new(FlakyEndpoint::new(true));
    let store =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::<String>::new(), raw_config())
            .unwrap();

    for i in 0..500 {
        let name = format!("file{}.c", i);
        let node = leaves(&[name.as_str()]);

        let first = store.fingerprint_and_store(&node).unwrap();
        assert!(first.wait_durable().await.is_err());
        let before = endpoint.attempts.load(Ordering::SeqCst);

        let retry = store.fingerprint_and_store(&node).unwrap();
        assert!(retry.wait_durable().await.is_err());
        assert_eq!(
            endpoint.attempts.load(Ordering::SeqCst),
            before + 1,
            "retry {} must issue a new put",
            i
        );
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_roundtrip_preserves_order_and_structure() {
    let (store, endpoint) = memory_store(StoreConfig::default());
    let headers = leaves(&["a.h", "b.h"]);
    let nested = Node::new(vec![Entry::child(&headers), leaf("util.c")]);
    let root = Node::new(vec![
        leaf("z"),
        Entry::child(&headers),
        leaf("a"),
        Entry::child(&nested),
        leaf("z"),
        Entry::child(&Node::empty()),
    ]);

    let fp = store.store(&root).await.unwrap();

    let fresh: StringStore =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), StoreConfig::default())
            .unwrap();
    let restored = fresh.resolve(fp).await.unwrap();
    assert_eq!(restored, root);

    // the shared subset comes back as one object
    let first = match &restored.entries()[1] {
        Entry::Child(node) => node.clone(),
        other => panic!("expected a child, got {:?}", other),
    };
    let second = match &restored.entries()[3] {
        Entry::Child(nested) => match &nested.entries()[0] {
            Entry::Child(node) => node.clone(),
            other => panic!("expected a child, got {:?}", other),
        },
        other => panic!("expected a child, got {:?}", other),
    };
    assert!(Node::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_resolve_unknown_fingerprint_is_not_found() {
    let (store, _) = memory_store(raw_config());
    let missing = Fingerprint::digest(b"never stored");

    let err = store.resolve(missing).await.unwrap_err();
    assert!(err.is_not_found());

    // the failure is not cached
    assert!(store.resolve(missing).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_missing_child_fails_resolution() {
    let (store, endpoint) = memory_store(raw_config());
    let (a, b) = example_graph();
    let fp_a = store.store(&a).await.unwrap();
    let fp_b = store.fingerprint_and_store(&b).unwrap().fingerprint();
    endpoint.remove(&fp_b);

    let fresh: StringStore =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), raw_config()).unwrap();
    let err = fresh.resolve(fp_a).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(fp) if fp == fp_b));
}

#[tokio::test]
async fn test_corrupt_payload_is_rejected() {
    let (store, endpoint) = memory_store(raw_config());
    let fp = store.store(&leaves(&["real"])).await.unwrap();

    let forged_encoding = [1, 0, 6, b'"', b'f', b'a', b'k', b'e', b'"'];
    let forged = frame::seal(&forged_encoding, &raw_config()).unwrap();
    endpoint.overwrite(fp, forged);

    let fresh: StringStore =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), raw_config()).unwrap();
    let err = fresh.resolve(fp).await.unwrap_err();
    assert!(matches!(err, Error::FingerprintMismatch { expected, .. } if expected == fp));
}

#[tokio::test]
async fn test_resolved_node_is_already_fingerprinted() {
    let (store, endpoint) = memory_store(raw_config());
    let (a, _) = example_graph();
    let fp = store.store(&a).await.unwrap();

    let fresh: StringStore =
        NestedSetStore::with_config(endpoint.clone(), JsonCodec::new(), raw_config()).unwrap();
    let restored = fresh.resolve(fp).await.unwrap();

    let result = fresh.fingerprint_and_store(&restored).unwrap();
    assert_eq!(result.fingerprint(), fp);
    assert!(matches!(result.durability(), Some(Ok(()))));
    assert_eq!(endpoint.put_count(), 2);
    assert_eq!(fresh.cache_stats().puts_issued, 0);
}

#[tokio::test]
async fn test_resolve_after_store_is_served_from_memory() {
    let (store, endpoint) = memory_store(raw_config());
    let (a, _) = example_graph();
    let fp = store.store(&a).await.unwrap();

    let restored = store.resolve(fp).await.unwrap();
    assert!(Node::ptr_eq(&restored, &a));
    assert_eq!(endpoint.get_count(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fingerprinting_writes_each_node_once() {
    let (store, endpoint) = memory_store(raw_config());
    let shared = leaves(&["a.h", "b.h", "c.h"]);
    let root = Node::new(
        (0..8)
            .map(|i| Node::new(vec![leaf(&format!("src{}.c", i)), Entry::child(&shared)]))
            .map(Entry::Child)
            .collect(),
    );

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let store = store.clone();
            let root = root.clone();
            tokio::spawn(async move {
                let result = store.fingerprint_and_store(&root).unwrap();
                result.wait_durable().await.unwrap();
                result.fingerprint()
            })
        })
        .collect();

    let fingerprints = futures::future::try_join_all(handles).await.unwrap();
    assert!(fingerprints.windows(2).all(|w| w[0] == w[1]));

    // root, eight targets, one shared header set
    assert_eq!(endpoint.len(), 10);
    assert_eq!(endpoint.put_count(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_share_one_fetch() {
    let backing = Arc::new(MemoryEndpoint::new());
    let writer: StringStore =
        NestedSetStore::with_config(backing.clone(), JsonCodec::new(), raw_config()).unwrap();
    let (a, _) = example_graph();
    let fp = writer.store(&a).await.unwrap();

    let slow = Arc::new(SlowEndpoint {
        inner: backing.clone(),
        delay: Duration::from_millis(50),
    });
    let reader: StringStore =
        NestedSetStore::with_config(slow, JsonCodec::new(), raw_config()).unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let reader = reader.clone();
            tokio::spawn(async move { reader.resolve(fp).await.unwrap() })
        })
        .collect();
    let nodes = futures::future::try_join_all(handles).await.unwrap();

    assert!(nodes.iter().all(|node| *node == a));
    assert!(nodes.windows(2).all(|w| Node::ptr_eq(&w[0], &w[1])));
    assert_eq!(backing.get_count(), 2);
}

// ============================================================================
// File endpoint
// ============================================================================

#[tokio::test]
async fn test_file_endpoint_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.nestset");
    let (a, _) = example_graph();

    let fp = {
        let endpoint = FileEndpoint::create(&path).unwrap();
        let store: StringStore =
            NestedSetStore::new(Arc::new(endpoint.clone()), JsonCodec::new()).unwrap();
        let fp = store.store(&a).await.unwrap();
        endpoint.sync().unwrap();
        assert_eq!(endpoint.object_count(), 2);
        fp
    };

    let endpoint = FileEndpoint::open(&path).unwrap();
    let store: StringStore = NestedSetStore::new(Arc::new(endpoint), JsonCodec::new()).unwrap();
    assert_eq!(store.resolve(fp).await.unwrap(), a);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_store_requires_a_runtime() {
    let outcome = NestedSetStore::in_memory(JsonCodec::<String>::new());
    assert!(matches!(outcome, Err(Error::Runtime(_))));
}

#[test]
fn test_store_with_explicit_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let endpoint = Arc::new(MemoryEndpoint::new());
    let store = NestedSetStore::with_runtime(
        endpoint.clone(),
        JsonCodec::<String>::new(),
        raw_config(),
        runtime.handle().clone(),
    );

    let result = store.fingerprint_and_store(&leaves(&["outside"])).unwrap();
    runtime.block_on(result.wait_durable()).unwrap();
    assert_eq!(endpoint.len(), 1);
}
