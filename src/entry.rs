use crate::attribute::Attribute;
use crate::record::RecordMap;
use crate::tree::ContextTree;
use crate::types::{Id, NodeId};
use crate::variant::Variant;

/// One unit of snapshot data.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum Entry {
    /// Nothing; returned by lookups that miss.
    #[default]
    Empty,
    /// A context tree node, standing in for its whole ancestor chain.
    Reference(NodeId),
    /// A single value carried inline.
    Immediate { attribute: Id, value: Variant },
}

impl Entry {
    pub fn immediate(attribute: &Attribute, value: impl Into<Variant>) -> Self {
        Entry::Immediate {
            attribute: attribute.id(),
            value: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Entry::Empty)
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Entry::Immediate { .. })
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Entry::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Attribute of an immediate entry or of a referenced node.
    pub fn attribute(&self, tree: &ContextTree) -> Id {
        match self {
            Entry::Empty => Id::INVALID,
            Entry::Reference(id) => tree.node(*id).map_or(Id::INVALID, |n| n.attribute()),
            Entry::Immediate { attribute, .. } => *attribute,
        }
    }

    /// Value of an immediate entry or of a referenced node.
    pub fn value(&self, tree: &ContextTree) -> Variant {
        match self {
            Entry::Empty => Variant::Empty,
            Entry::Reference(id) => tree
                .node(*id)
                .map(|n| n.value().clone())
                .unwrap_or_default(),
            Entry::Immediate { value, .. } => value.clone(),
        }
    }

    pub fn record(&self, tree: &ContextTree) -> RecordMap {
        match self {
            Entry::Empty => RecordMap::new(),
            Entry::Reference(id) => RecordMap::new().with("ref", id.0),
            Entry::Immediate { .. } => RecordMap::new()
                .with("attribute", self.attribute(tree).0)
                .with("value", self.value(tree)),
        }
    }
}
