use crate::record::RecordMap;
use crate::types::{AttrProperties, AttrType, Id};
use crate::variant::Variant;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Immutable description of a named, typed context dimension.
///
/// Attributes compare, order and hash by identity. Within one registry an
/// identity maps to exactly one name.
#[derive(Clone, Debug)]
pub struct Attribute {
    id: Id,
    name: Arc<str>,
    ty: AttrType,
    properties: AttrProperties,
}

impl Attribute {
    pub(crate) fn new(id: Id, name: Arc<str>, ty: AttrType, properties: AttrProperties) -> Self {
        Self {
            id,
            name,
            ty,
            properties,
        }
    }

    /// The sentinel returned by lookups that miss.
    pub fn invalid() -> Attribute {
        static INVALID: OnceLock<Attribute> = OnceLock::new();
        INVALID
            .get_or_init(|| {
                Attribute::new(
                    Id::INVALID,
                    Arc::from(""),
                    AttrType::Inv,
                    AttrProperties::DEFAULT,
                )
            })
            .clone()
    }

    pub fn is_valid(&self) -> bool {
        self.id.is_valid()
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> AttrType {
        self.ty
    }

    pub fn properties(&self) -> AttrProperties {
        self.properties
    }

    /// Values are carried as immediate snapshot entries rather than tree nodes.
    pub fn is_immediate(&self) -> bool {
        self.properties.is_immediate()
    }

    pub fn is_global(&self) -> bool {
        self.properties.contains(AttrProperties::GLOBAL)
    }

    pub fn record(&self) -> RecordMap {
        RecordMap::new()
            .with("attribute_id", self.id.0)
            .with("name", Variant::string(self.name.as_bytes()))
            .with("type", self.ty)
            .with("properties", u64::from(self.properties.bits()))
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Attribute {}

impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
