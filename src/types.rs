use crate::error::Error;
use bitflags::bitflags;
use derive_more::{Display, From, Into};
use std::str::FromStr;

/// Raw value of the reserved "invalid identity" sentinel.
pub const INV_ID: u64 = u64::MAX;

/// Identity of an [`Attribute`](crate::attribute::Attribute).
///
/// Identities are dense and allocated in creation order starting at 0.
/// The all-ones pattern is never handed out.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display,
)]
#[repr(transparent)]
pub struct Id(pub u64);

impl Id {
    pub const INVALID: Id = Id(INV_ID);

    pub fn is_valid(self) -> bool {
        self.0 != INV_ID
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a context tree node; an index into the tree's arena.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display,
)]
#[repr(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The root of every context tree.
    pub const ROOT: NodeId = NodeId(0);
    pub const INVALID: NodeId = NodeId(INV_ID);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum AttrType {
    #[display(fmt = "inv")]
    Inv,
    #[display(fmt = "usr")]
    Usr,
    #[display(fmt = "int")]
    Int,
    #[display(fmt = "uint")]
    Uint,
    #[display(fmt = "string")]
    String,
    #[display(fmt = "addr")]
    Addr,
    #[display(fmt = "double")]
    Double,
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "type")]
    Type,
}

impl AttrType {
    pub const ALL: [AttrType; 9] = [
        AttrType::Inv,
        AttrType::Usr,
        AttrType::Int,
        AttrType::Uint,
        AttrType::String,
        AttrType::Addr,
        AttrType::Double,
        AttrType::Bool,
        AttrType::Type,
    ];

    /// Encoded payload size for fixed-size types, `None` for variable-length ones.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            AttrType::Int | AttrType::Uint | AttrType::Addr | AttrType::Double => Some(8),
            AttrType::Bool | AttrType::Type => Some(1),
            AttrType::Inv => Some(0),
            AttrType::Usr | AttrType::String => None,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            AttrType::Inv => 0xFF,
            AttrType::Usr => 0,
            AttrType::Int => 1,
            AttrType::Uint => 2,
            AttrType::String => 3,
            AttrType::Addr => 4,
            AttrType::Double => 5,
            AttrType::Bool => 6,
            AttrType::Type => 7,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        AttrType::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl FromStr for AttrType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        AttrType::ALL
            .into_iter()
            .find(|t| t.to_string() == s)
            .ok_or_else(|| Error::InvalidType(s.to_owned()))
    }
}

bitflags! {
    /// Storage and propagation properties of an attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttrProperties: u32 {
        /// Store values inline in snapshots instead of as tree nodes.
        const AS_VALUE = 1 << 0;
        /// Never deduplicate values into the shared context tree.
        const NOMERGE = 1 << 1;
        /// Carry the value in every snapshot.
        const GLOBAL = 1 << 2;
    }
}

impl AttrProperties {
    pub const DEFAULT: AttrProperties = AttrProperties::empty();

    /// Whether values of this attribute bypass the context tree.
    pub fn is_immediate(self) -> bool {
        self.intersects(AttrProperties::AS_VALUE | AttrProperties::NOMERGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_names_round_trip() {
        for t in AttrType::ALL {
            assert_eq!(t.to_string().parse::<AttrType>().unwrap(), t);
            assert_eq!(AttrType::from_code(t.code()), Some(t));
        }
        assert_eq!(" uint ".parse::<AttrType>().unwrap(), AttrType::Uint);
        assert!(matches!(
            "float".parse::<AttrType>(),
            Err(Error::InvalidType(s)) if s == "float"
        ));
    }

    #[test]
    fn sentinel_ids() {
        assert!(!Id::INVALID.is_valid());
        assert!(Id(0).is_valid());
        assert_eq!(u64::from(Id::INVALID), INV_ID);
        assert!(NodeId::ROOT.is_root());
    }

    #[test]
    fn immediate_properties() {
        assert!(!AttrProperties::DEFAULT.is_immediate());
        assert!(!AttrProperties::GLOBAL.is_immediate());
        assert!(AttrProperties::AS_VALUE.is_immediate());
        assert!((AttrProperties::NOMERGE | AttrProperties::GLOBAL).is_immediate());
        assert_eq!(AttrProperties::DEFAULT.bits(), 0);
    }
}
