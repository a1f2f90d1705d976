use std::sync::Arc;

use crate::nibbles::Nibbles;
use crate::version::{Ref, Version};

/// Cache metadata carried by [`FullNode`] and [`ShortNode`]. `cache` holds
/// the canonical `Ref` once it has been computed by the hasher engine;
/// it is cleared (and `dirty` set) the moment a node is copy-on-write
/// cloned for mutation. See spec invariants I4/I5.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFlags {
    pub dirty: bool,
    pub gen: u16,
    pub cache: Option<Ref>,
}

impl NodeFlags {
    /// Flags for a freshly created or mutated node: dirty, stamped with
    /// the trie's current cache generation, with no cached ref.
    pub fn fresh(gen: u16) -> Self {
        Self {
            dirty: true,
            gen,
            cache: None,
        }
    }
}

/// An extension (when `child` is Full/Short/Ref) or a leaf carrier (when
/// `child` is a [`ValueNode`] and `key` ends with the terminator nibble).
#[derive(Debug, Clone)]
pub struct ShortNode {
    pub key: Nibbles,
    pub child: Arc<Node>,
    pub flags: NodeFlags,
}

impl PartialEq for ShortNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.child == other.child
    }
}
impl Eq for ShortNode {}

/// 17-way branch: indices 0..=15 are nibble children, index 16 is the
/// direct value slot used when a leaf's path ends exactly at this node.
#[derive(Debug, Clone)]
pub struct FullNode {
    pub children: [Option<Arc<Node>>; 17],
    pub flags: NodeFlags,
}

impl FullNode {
    pub fn empty() -> Self {
        Self {
            children: std::array::from_fn(|_| None),
            flags: NodeFlags::default(),
        }
    }

    /// Number of non-nil slots, used by the delete path to decide whether
    /// a branch must collapse back into a [`ShortNode`] (invariant I3).
    pub fn count_children(&self) -> usize {
        self.children.iter().filter(|c| c.is_some()).count()
    }

    /// Returns the index of the lone remaining child, if exactly one slot
    /// is occupied.
    pub fn only_child(&self) -> Option<usize> {
        let mut found = None;
        for (i, child) in self.children.iter().enumerate() {
            if child.is_some() {
                if found.is_some() {
                    return None;
                }
                found = Some(i);
            }
        }
        found
    }
}

impl PartialEq for FullNode {
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
    }
}
impl Eq for FullNode {}

/// A lazy pointer to a stored node, not yet materialised in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefNode {
    pub r: Ref,
}

impl RefNode {
    pub fn new(r: Ref) -> Self {
        Self { r }
    }
}

/// Terminal leaf data. `meta` is opaque to the trie: persisted and
/// returned alongside `value` but never hashed (invariant I7).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueNode {
    pub value: Vec<u8>,
    pub meta: Vec<u8>,
}

/// The four node variants described by the spec's data model. Children are
/// held behind `Arc` so that copy-on-write mutation (`Arc::make_mut`) only
/// clones the nodes actually on the mutated path, not the whole subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Full(FullNode),
    Short(ShortNode),
    Ref(RefNode),
    Value(ValueNode),
}

impl Node {
    pub fn full(node: FullNode) -> Arc<Node> {
        Arc::new(Node::Full(node))
    }

    pub fn short(node: ShortNode) -> Arc<Node> {
        Arc::new(Node::Short(node))
    }

    pub fn value(value: Vec<u8>, meta: Vec<u8>) -> Arc<Node> {
        Arc::new(Node::Value(ValueNode { value, meta }))
    }

    pub fn reference(r: Ref) -> Arc<Node> {
        Arc::new(Node::Ref(RefNode::new(r)))
    }

    pub fn as_ref_node(&self) -> Option<&RefNode> {
        match self {
            Node::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueNode> {
        match self {
            Node::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The node's cached ref, if it has one. Value/Ref nodes never cache
    /// (a RefNode carries its own identity directly; a ValueNode is never
    /// hashed on its own, only as part of its parent's encoding).
    pub fn cached_ref(&self) -> Option<Ref> {
        match self {
            Node::Full(n) => n.flags.cache,
            Node::Short(n) => n.flags.cache,
            Node::Ref(r) => Some(r.r),
            Node::Value(_) => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Node::Full(n) => n.flags.dirty,
            Node::Short(n) => n.flags.dirty,
            Node::Ref(_) | Node::Value(_) => false,
        }
    }

    pub fn gen(&self) -> Option<u16> {
        match self {
            Node::Full(n) => Some(n.flags.gen),
            Node::Short(n) => Some(n.flags.gen),
            Node::Ref(_) | Node::Value(_) => None,
        }
    }
}
