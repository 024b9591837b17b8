//! Nested set nodes
//!
//! A [`Node`] is an immutable, ordered sequence of entries, each either a leaf
//! value or a reference to another node. Cloning a node shares the same object,
//! which is what the backward cache keys on.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

/// One entry of a node: a leaf value or a child node
#[derive(Clone, Debug, PartialEq)]
pub enum Entry<L> {
    /// An opaque leaf value, encoded by the store's leaf codec
    Leaf(L),
    /// A reference to another node, encoded as that node's fingerprint
    Child(Node<L>),
}

impl<L> Entry<L> {
    /// Create a leaf entry
    pub fn leaf(value: L) -> Self {
        Entry::Leaf(value)
    }

    /// Create a child entry
    pub fn child(node: &Node<L>) -> Self {
        Entry::Child(node.clone())
    }

    /// Whether this entry is a child reference
    pub fn is_child(&self) -> bool {
        matches!(self, Entry::Child(_))
    }
}

impl<L> From<Node<L>> for Entry<L> {
    fn from(node: Node<L>) -> Self {
        Entry::Child(node)
    }
}

/// Stable identity of a node object
///
/// The address of the node's shared allocation. It stays unique for as long as
/// any strong or weak handle to the node is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An immutable nested set node
pub struct Node<L> {
    entries: Arc<[Entry<L>]>,
}

impl<L> Node<L> {
    /// Create a node from its entries
    pub fn new(entries: Vec<Entry<L>>) -> Self {
        Node {
            entries: Arc::from(entries),
        }
    }

    /// Create a node containing only leaves
    pub fn from_leaves(leaves: impl IntoIterator<Item = L>) -> Self {
        Node::new(leaves.into_iter().map(Entry::Leaf).collect())
    }

    /// Create an empty node
    pub fn empty() -> Self {
        Node::new(Vec::new())
    }

    /// The node's direct entries, in order
    pub fn entries(&self) -> &[Entry<L>] {
        &self.entries
    }

    /// Number of direct entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct child nodes, in order
    pub fn children(&self) -> impl Iterator<Item = &Node<L>> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Child(child) => Some(child),
            Entry::Leaf(_) => None,
        })
    }

    /// Object identity of this node
    pub fn id(&self) -> NodeId {
        NodeId(Arc::as_ptr(&self.entries) as *const () as usize)
    }

    /// Whether two handles refer to the same node object
    pub fn ptr_eq(a: &Node<L>, b: &Node<L>) -> bool {
        Arc::ptr_eq(&a.entries, &b.entries)
    }

    /// All leaves in depth-first order
    ///
    /// Each distinct child object is expanded once, so a subtree shared by many
    /// parents contributes its leaves a single time.
    pub fn leaves(&self) -> Vec<&L> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        collect_leaves(self, &mut seen, &mut out);
        out
    }

    pub(crate) fn downgrade(&self) -> WeakNode<L> {
        WeakNode(Arc::downgrade(&self.entries))
    }
}

fn collect_leaves<'a, L>(node: &'a Node<L>, seen: &mut HashSet<NodeId>, out: &mut Vec<&'a L>) {
    for entry in node.entries.iter() {
        match entry {
            Entry::Leaf(leaf) => out.push(leaf),
            Entry::Child(child) => {
                if seen.insert(child.id()) {
                    collect_leaves(child, seen, out);
                }
            }
        }
    }
}

impl<L> Clone for Node<L> {
    fn clone(&self) -> Self {
        Node {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<L: PartialEq> PartialEq for Node<L> {
    fn eq(&self, other: &Self) -> bool {
        Node::ptr_eq(self, other) || self.entries[..] == other.entries[..]
    }
}

impl<L: fmt::Debug> fmt::Debug for Node<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<L> FromIterator<Entry<L>> for Node<L> {
    fn from_iter<I: IntoIterator<Item = Entry<L>>>(iter: I) -> Self {
        Node::new(iter.into_iter().collect())
    }
}

/// Non-owning handle to a node, used by the caches
pub(crate) struct WeakNode<L>(Weak<[Entry<L>]>);

impl<L> WeakNode<L> {
    pub(crate) fn upgrade(&self) -> Option<Node<L>> {
        self.0.upgrade().map(|entries| Node { entries })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl<L> Clone for WeakNode<L> {
    fn clone(&self) -> Self {
        WeakNode(Weak::clone(&self.0))
    }
}
