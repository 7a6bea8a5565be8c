//! Snapshot records and hierarchical contributions to them.

use crate::attribute::Attribute;
use crate::entry::Entry;
use crate::tree::ContextTree;
use crate::types::{Id, NodeId};
use crate::variant::{Variant, VariantRef};
use smallvec::SmallVec;

/// Entries stored without a heap allocation.
///
/// Typical captures hold one reference plus a handful of immediates. Records
/// with a larger capacity spill to the heap once they grow past this, which
/// keeps the record small enough to move around by value.
const INLINE_ENTRIES: usize = 16;

/// A bounded sequence of entries captured at one point in time.
///
/// A record never grows past the capacity it was created with. Appends that do
/// not fit are dropped and counted in [`SnapshotRecord::skipped`]. Up to
/// 16 entries live inline; beyond that the entries move to one heap buffer.
#[derive(Clone, Debug)]
pub struct SnapshotRecord {
    entries: SmallVec<[Entry; INLINE_ENTRIES]>,
    capacity: usize,
    skipped: usize,
}

impl SnapshotRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SmallVec::new(),
            capacity,
            skipped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Number of entries dropped because the record was full.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.entries.iter()
    }

    /// Appends `entry`, returning false if the record is full.
    pub fn append(&mut self, entry: Entry) -> bool {
        if entry.is_empty() {
            return true;
        }
        if self.is_full() {
            self.skipped += 1;
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn append_reference(&mut self, node: NodeId) -> bool {
        self.append(Entry::Reference(node))
    }

    pub fn append_immediate(&mut self, attribute: &Attribute, value: impl Into<Variant>) -> bool {
        self.append(Entry::immediate(attribute, value))
    }

    /// Appends a hierarchical contribution collected innermost level first.
    ///
    /// Levels are reversed once so they land root-to-leaf; pairs within a level
    /// keep their order. A level that does not fit completely is dropped as a
    /// whole and all of its pairs count as skipped. String payloads are copied
    /// out of the buffer's storage. Returns the number of entries appended.
    pub fn append_levels(&mut self, levels: LevelBuffer<'_>) -> usize {
        let mut appended = 0;
        for level in levels.levels().rev() {
            if self.capacity.saturating_sub(self.len()) < level.len() {
                self.skipped += level.len();
                continue;
            }
            for (attr, value) in level {
                self.entries.push(Entry::Immediate {
                    attribute: attr.id(),
                    value: Variant::from(*value),
                });
            }
            appended += level.len();
        }
        appended
    }

    /// Replaces the value of the first immediate entry for `attribute`.
    ///
    /// Reference entries are shared tree paths and are never rewritten.
    /// Returns false if the record holds no immediate entry for `attribute`.
    pub fn set(&mut self, attribute: &Attribute, value: impl Into<Variant>) -> bool {
        let target = attribute.id();
        match self.entries.iter_mut().find_map(|e| match e {
            Entry::Immediate { attribute, value } if *attribute == target => Some(value),
            _ => None,
        }) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Finds the entry holding `attribute`.
    ///
    /// Reference entries are searched along their whole path and yield the
    /// nearest node with that attribute. Misses return [`Entry::Empty`].
    pub fn get(&self, tree: &ContextTree, attribute: &Attribute) -> Entry {
        if !attribute.is_valid() {
            return Entry::Empty;
        }
        for e in self.entries.iter() {
            match e {
                Entry::Immediate { attribute: a, .. } if *a == attribute.id() => {
                    return e.clone();
                }
                Entry::Reference(id) => {
                    if let Some(n) = tree.find_in_path(*id, attribute.id()) {
                        return Entry::Reference(n.id());
                    }
                }
                _ => {}
            }
        }
        Entry::Empty
    }

    /// Expands the record into `(attribute, value)` pairs.
    ///
    /// Each reference contributes its path root-to-leaf, in entry order.
    pub fn unpack(&self, tree: &ContextTree) -> Vec<(Id, Variant)> {
        let mut out = Vec::with_capacity(self.entries.len());
        for e in self.entries.iter() {
            match e {
                Entry::Empty => {}
                Entry::Reference(id) => out.extend(
                    tree.path(*id)
                        .into_iter()
                        .map(|n| (n.attribute(), n.value().clone())),
                ),
                Entry::Immediate { attribute, value } => out.push((*attribute, value.clone())),
            }
        }
        out
    }

}

/// Collects a hierarchical contribution one context level at a time.
///
/// Producers walk a context path from the innermost node outwards and push one
/// level per node. A level's attribute/value pairs are pushed together, so a
/// value can never drift away from its attribute when the levels are reversed
/// by [`SnapshotRecord::append_levels`].
#[derive(Clone, Debug, Default)]
pub struct LevelBuffer<'a> {
    pairs: Vec<(Attribute, VariantRef<'a>)>,
    starts: Vec<usize>,
}

impl<'a> LevelBuffer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the pairs of the next outer level.
    pub fn push_level<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (Attribute, VariantRef<'a>)>,
    {
        let start = self.pairs.len();
        self.pairs.extend(pairs);
        if self.pairs.len() > start {
            self.starts.push(start);
        }
    }

    /// Number of levels pushed.
    pub fn depth(&self) -> usize {
        self.starts.len()
    }

    /// Number of pairs over all levels.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Levels in push order, innermost first.
    pub fn levels(
        &self,
    ) -> impl DoubleEndedIterator<Item = &[(Attribute, VariantRef<'a>)]> + '_ {
        self.starts.iter().enumerate().map(move |(i, &start)| {
            let end = self.starts.get(i + 1).copied().unwrap_or(self.pairs.len());
            &self.pairs[start..end]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MemoryPool;
    use crate::registry::AttributeStore;
    use crate::types::{AttrProperties, AttrType};
    use pretty_assertions::assert_eq;

    #[test]
    fn capacity_is_a_hard_limit() {
        let store = AttributeStore::new();
        let a = store.create("a", AttrType::Int, AttrProperties::AS_VALUE);
        let mut rec = SnapshotRecord::with_capacity(2);

        assert!(rec.append_immediate(&a, 1_i64));
        assert!(rec.append_immediate(&a, 2_i64));
        assert!(!rec.append_immediate(&a, 3_i64));
        assert!(rec.append(Entry::Empty));
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.skipped(), 1);
        assert!(rec.is_full());
    }

    #[test]
    fn get_searches_reference_paths() {
        let store = AttributeStore::new();
        let function = store.create("function", AttrType::String, AttrProperties::DEFAULT);
        let line = store.create("line", AttrType::Uint, AttrProperties::DEFAULT);
        let iter = store.create("iteration", AttrType::Uint, AttrProperties::AS_VALUE);
        let missing = store.create("missing", AttrType::Uint, AttrProperties::DEFAULT);
        let tree = ContextTree::new();
        let leaf = tree
            .get_or_make_path(
                tree.root(),
                [(&function, Variant::from("foo")), (&line, Variant::from(10_u64))],
            )
            .unwrap();

        let mut rec = SnapshotRecord::with_capacity(8);
        rec.append_reference(leaf.id());
        rec.append_immediate(&iter, 7_u64);

        let e = rec.get(&tree, &function);
        assert_eq!(e.node(), tree.parent(leaf.id()));
        assert_eq!(e.value(&tree), Variant::from("foo"));
        assert_eq!(rec.get(&tree, &line), Entry::Reference(leaf.id()));
        assert_eq!(rec.get(&tree, &iter), Entry::immediate(&iter, 7_u64));
        assert!(rec.get(&tree, &missing).is_empty());
        assert!(rec.get(&tree, &Attribute::invalid()).is_empty());
    }

    #[test]
    fn unpack_is_root_to_leaf() {
        let store = AttributeStore::new();
        let a = store.create("a", AttrType::String, AttrProperties::DEFAULT);
        let b = store.create("b", AttrType::String, AttrProperties::DEFAULT);
        let c = store.create("c", AttrType::String, AttrProperties::DEFAULT);
        let tree = ContextTree::new();
        let leaf = tree
            .get_or_make_path(
                tree.root(),
                [
                    (&a, Variant::from("A")),
                    (&b, Variant::from("B")),
                    (&c, Variant::from("C")),
                ],
            )
            .unwrap();

        let mut rec = SnapshotRecord::with_capacity(4);
        rec.append_reference(leaf.id());
        assert_eq!(
            rec.unpack(&tree),
            vec![
                (a.id(), Variant::from("A")),
                (b.id(), Variant::from("B")),
                (c.id(), Variant::from("C")),
            ]
        );
    }

    #[test]
    fn levels_are_reversed_as_groups() {
        let store = AttributeStore::new();
        let file = store.create("source.file", AttrType::String, AttrProperties::DEFAULT);
        let line = store.create("source.line", AttrType::Uint, AttrProperties::DEFAULT);
        let tree = ContextTree::new();
        let pool = MemoryPool::new();

        let mut rec = SnapshotRecord::with_capacity(8);
        {
            let mut levels = LevelBuffer::new();
            for (f, l) in [("inner.c", 2_u64), ("outer.c", 1_u64)] {
                let f = pool.alloc_str(f);
                levels.push_level([
                    (file.clone(), VariantRef::string(f)),
                    (line.clone(), VariantRef::Uint(l)),
                ]);
            }
            levels.push_level(Vec::new());
            assert_eq!(levels.depth(), 2);
            assert_eq!(levels.len(), 4);
            assert_eq!(rec.append_levels(levels), 4);
        }
        drop(pool);

        assert_eq!(
            rec.unpack(&tree),
            vec![
                (file.id(), Variant::from("outer.c")),
                (line.id(), Variant::Uint(1)),
                (file.id(), Variant::from("inner.c")),
                (line.id(), Variant::Uint(2)),
            ]
        );
    }

    #[test]
    fn level_that_does_not_fit_is_dropped_whole() {
        let store = AttributeStore::new();
        let file = store.create("source.file", AttrType::String, AttrProperties::DEFAULT);
        let line = store.create("source.line", AttrType::Uint, AttrProperties::DEFAULT);
        let mut rec = SnapshotRecord::with_capacity(4);
        rec.append_reference(NodeId(1));

        let mut levels = LevelBuffer::new();
        for (f, l) in [("inner.c", 2_u64), ("outer.c", 1_u64)] {
            levels.push_level([
                (file.clone(), VariantRef::string(f)),
                (line.clone(), VariantRef::Uint(l)),
            ]);
        }

        assert_eq!(rec.append_levels(levels), 2);
        assert_eq!(rec.skipped(), 2);
        assert_eq!(
            rec.entries(),
            &[
                Entry::Reference(NodeId(1)),
                Entry::immediate(&file, "outer.c"),
                Entry::immediate(&line, 1_u64),
            ]
        );

        let mut full = SnapshotRecord::with_capacity(2);
        full.append_reference(NodeId(1));
        let mut levels = LevelBuffer::new();
        levels.push_level([
            (file.clone(), VariantRef::string("a.c")),
            (line.clone(), VariantRef::Uint(42)),
        ]);
        assert_eq!(full.append_levels(levels), 0);
        assert_eq!(full.entries(), &[Entry::Reference(NodeId(1))]);
        assert_eq!(full.skipped(), 2);
    }

    #[test]
    fn set_rewrites_immediate_values() {
        let store = AttributeStore::new();
        let phase = store.create("phase", AttrType::String, AttrProperties::AS_VALUE);
        let function = store.create("function", AttrType::String, AttrProperties::DEFAULT);
        let tree = ContextTree::new();
        let node = tree
            .get_or_make_child(tree.root(), &function, Variant::from("main"))
            .unwrap();

        let mut rec = SnapshotRecord::with_capacity(4);
        rec.append_reference(node.id());
        rec.append_immediate(&phase, "setup");

        assert!(rec.set(&phase, "solve"));
        assert_eq!(rec.get(&tree, &phase), Entry::immediate(&phase, "solve"));
        assert!(!rec.set(&function, "other"));
        assert_eq!(rec.get(&tree, &function).value(&tree), Variant::from("main"));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn append_levels_respects_capacity() {
        let store = AttributeStore::new();
        let x = store.create("x", AttrType::Uint, AttrProperties::DEFAULT);
        let mut levels = LevelBuffer::new();
        for i in 0..3_u64 {
            levels.push_level([(x.clone(), VariantRef::Uint(i))]);
        }
        let mut rec = SnapshotRecord::with_capacity(2);
        assert_eq!(rec.append_levels(levels), 2);
        assert_eq!(rec.skipped(), 1);
        assert_eq!(
            rec.entries(),
            &[Entry::immediate(&x, 2_u64), Entry::immediate(&x, 1_u64)]
        );
    }
}
