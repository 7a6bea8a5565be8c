//! The shared context tree.
//!
//! Every node stores one `(attribute, value)` pair and the identity of its
//! parent. The path from the root to a node is one nested annotation stack,
//! so a single [`NodeId`] stands in for the whole stack in a snapshot.
//!
//! Nodes live in an append-only arena addressed by dense indices and are never
//! removed while the tree lives. Child lookup goes through a sharded index
//! keyed by `(parent, attribute, value)`; a shard's write lock is held across
//! the re-check and the arena append, which keeps exactly one node per key.

use crate::attribute::Attribute;
use crate::record::RecordMap;
use crate::types::{Id, NodeId};
use crate::variant::Variant;
use parking_lot::RwLock;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};

const SHARDS: usize = 16;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Node {
    id: NodeId,
    attribute: Id,
    value: Variant,
    parent: Option<NodeId>,
    depth: usize,
}

impl Node {
    fn root() -> Self {
        Node {
            id: NodeId::ROOT,
            attribute: Id::INVALID,
            value: Variant::Empty,
            parent: None,
            depth: 0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn attribute(&self) -> Id {
        self.attribute
    }

    pub fn value(&self) -> &Variant {
        &self.value
    }

    /// The parent node, `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Number of edges between this node and the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.id.is_root()
    }

    pub fn record(&self) -> RecordMap {
        let mut r = RecordMap::new()
            .with("node_id", self.id.0)
            .with("attribute", self.attribute.0)
            .with("value", self.value.clone());
        if let Some(p) = self.parent.filter(|p| !p.is_root()) {
            r.insert("parent_id", p.0);
        }
        r
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct ChildKey {
    parent: NodeId,
    attribute: Id,
    value: Variant,
}

#[derive(Debug)]
pub struct ContextTree {
    nodes: RwLock<Vec<Node>>,
    index: Box<[RwLock<HashMap<ChildKey, NodeId>>]>,
    hasher: RandomState,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(vec![Node::root()]),
            index: (0..SHARDS).map(|_| RwLock::default()).collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Returns the child of `parent` holding `(attribute, value)`, creating it
    /// if this combination has not been seen under `parent` before.
    ///
    /// Returns `None` if `parent` is not a node of this tree or `attribute` is
    /// the invalid sentinel.
    pub fn get_or_make_child(
        &self,
        parent: NodeId,
        attribute: &Attribute,
        value: Variant,
    ) -> Option<Node> {
        if !attribute.is_valid() {
            return None;
        }
        let parent_depth = self.node(parent)?.depth;
        let key = ChildKey {
            parent,
            attribute: attribute.id(),
            value,
        };
        let shard = &self.index[self.shard_of(&key)];

        if let Some(id) = shard.read().get(&key) {
            return self.node(*id);
        }

        let mut shard = shard.write();
        if let Some(id) = shard.get(&key) {
            return self.node(*id);
        }
        let node = {
            let mut nodes = self.nodes.write();
            let node = Node {
                id: NodeId(nodes.len() as u64),
                attribute: key.attribute,
                value: key.value.clone(),
                parent: Some(parent),
                depth: parent_depth + 1,
            };
            nodes.push(node.clone());
            node
        };
        shard.insert(key, node.id);
        Some(node)
    }

    /// Walks `path` down from `parent`, creating missing nodes, and returns the
    /// innermost node.
    pub fn get_or_make_path<'a, I>(&self, parent: NodeId, path: I) -> Option<Node>
    where
        I: IntoIterator<Item = (&'a Attribute, Variant)>,
    {
        let mut node = self.node(parent)?;
        for (attr, value) in path {
            node = self.get_or_make_child(node.id, attr, value)?;
        }
        Some(node)
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.nodes.read().get(id.index()).cloned()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.read().get(id.index()).and_then(|n| n.parent)
    }

    /// Nodes from `id` up to, but excluding, the root; innermost first.
    pub fn ancestors(&self, id: NodeId) -> Vec<Node> {
        let nodes = self.nodes.read();
        let mut chain = Vec::new();
        let mut cursor = nodes.get(id.index());
        while let Some(n) = cursor.filter(|n| !n.is_root()) {
            chain.push(n.clone());
            cursor = n.parent.and_then(|p| nodes.get(p.index()));
        }
        chain
    }

    /// Nodes from the root's child down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<Node> {
        let mut chain = self.ancestors(id);
        chain.reverse();
        chain
    }

    /// Nearest node at or above `id` that holds `attribute`.
    pub fn find_in_path(&self, id: NodeId, attribute: Id) -> Option<Node> {
        let nodes = self.nodes.read();
        let mut cursor = nodes.get(id.index());
        while let Some(n) = cursor.filter(|n| !n.is_root()) {
            if n.attribute == attribute {
                return Some(n.clone());
            }
            cursor = n.parent.and_then(|p| nodes.get(p.index()));
        }
        None
    }

    /// All nodes except the root, in creation order.
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.read().iter().skip(1).cloned().collect()
    }

    /// Number of nodes, not counting the root.
    pub fn len(&self) -> usize {
        self.nodes.read().len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_of(&self, key: &ChildKey) -> usize {
        let mut h = self.hasher.build_hasher();
        key.hash(&mut h);
        (h.finish() as usize) % self.index.len()
    }
}
