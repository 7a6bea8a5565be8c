use crate::attribute::Attribute;
use crate::types::{AttrProperties, AttrType, Id};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent create-or-get store of attributes keyed by name.
///
/// Lookups share a read lock. Creation takes the write lock only around the
/// check-then-insert, and first tries a read-locked lookup so repeated
/// creation of an existing name never contends with readers.
#[derive(Debug, Default)]
pub struct AttributeStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    attributes: Vec<Attribute>,
    names: HashMap<Arc<str>, Id>,
}

impl Inner {
    fn by_name(&self, name: &str) -> Option<&Attribute> {
        self.names
            .get(name)
            .and_then(|id| self.attributes.get(id.index()))
    }
}

impl AttributeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attribute called `name`, creating it on first use.
    ///
    /// Repeated calls return the original attribute unchanged, whatever type and
    /// properties they pass.
    pub fn create(&self, name: &str, ty: AttrType, properties: AttrProperties) -> Attribute {
        self.create_or_get(name, ty, properties).0
    }

    /// Like [`AttributeStore::create`], also reporting whether this call created it.
    pub fn create_or_get(
        &self,
        name: &str,
        ty: AttrType,
        properties: AttrProperties,
    ) -> (Attribute, bool) {
        if let Some(attr) = self.inner.read().by_name(name) {
            return (attr.clone(), false);
        }

        let mut inner = self.inner.write();
        if let Some(attr) = inner.by_name(name) {
            return (attr.clone(), false);
        }

        let id = Id(inner.attributes.len() as u64);
        debug_assert!(id.is_valid());
        let name: Arc<str> = Arc::from(name);
        let attr = Attribute::new(id, name.clone(), ty, properties);
        inner.names.insert(name, id);
        inner.attributes.push(attr.clone());
        (attr, true)
    }

    /// Returns the attribute with identity `id`, or [`Attribute::invalid`].
    pub fn get(&self, id: Id) -> Attribute {
        if !id.is_valid() {
            return Attribute::invalid();
        }
        self.inner
            .read()
            .attributes
            .get(id.index())
            .cloned()
            .unwrap_or_else(Attribute::invalid)
    }

    /// Returns the attribute called `name`, or [`Attribute::invalid`].
    pub fn get_by_name(&self, name: &str) -> Attribute {
        self.inner
            .read()
            .by_name(name)
            .cloned()
            .unwrap_or_else(Attribute::invalid)
    }

    /// All attributes in identity order.
    pub fn attributes(&self) -> Vec<Attribute> {
        self.inner.read().attributes.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
