use crate::error::Error;
use crate::types::AttrType;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A typed attribute value.
///
/// String and user payloads carry an explicit length and may contain any byte,
/// including NUL. They are reference counted so that copies held by the context
/// tree and by snapshot records share one allocation.
#[derive(Clone, Debug, Default)]
pub enum Variant {
    #[default]
    Empty,
    Usr(Arc<[u8]>),
    Int(i64),
    Uint(u64),
    String(Arc<[u8]>),
    Addr(u64),
    Double(f64),
    Bool(bool),
    Type(AttrType),
}

impl Variant {
    pub fn string(s: impl AsRef<[u8]>) -> Self {
        Variant::String(Arc::from(s.as_ref()))
    }

    pub fn usr(bytes: impl AsRef<[u8]>) -> Self {
        Variant::Usr(Arc::from(bytes.as_ref()))
    }

    pub fn addr(a: u64) -> Self {
        Variant::Addr(a)
    }

    pub fn ty(&self) -> AttrType {
        match self {
            Variant::Empty => AttrType::Inv,
            Variant::Usr(_) => AttrType::Usr,
            Variant::Int(_) => AttrType::Int,
            Variant::Uint(_) => AttrType::Uint,
            Variant::String(_) => AttrType::String,
            Variant::Addr(_) => AttrType::Addr,
            Variant::Double(_) => AttrType::Double,
            Variant::Bool(_) => AttrType::Bool,
            Variant::Type(_) => AttrType::Type,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// Size of the payload in bytes.
    pub fn size(&self) -> usize {
        match self {
            Variant::Usr(b) | Variant::String(b) => b.len(),
            v => v.ty().fixed_size().unwrap_or(0),
        }
    }

    /// Decodes a raw little-endian payload of the given type.
    ///
    /// Fixed-size types must be given exactly their encoded size.
    pub fn from_bytes(ty: AttrType, bytes: &[u8]) -> Result<Self, Error> {
        if let Some(expected) = ty.fixed_size() {
            if bytes.len() != expected {
                return Err(Error::PayloadSize {
                    ty,
                    expected,
                    actual: bytes.len(),
                });
            }
        }
        let word = || {
            let mut w = [0_u8; 8];
            w.copy_from_slice(bytes);
            w
        };
        Ok(match ty {
            AttrType::Inv => Variant::Empty,
            AttrType::Usr => Variant::usr(bytes),
            AttrType::String => Variant::string(bytes),
            AttrType::Int => Variant::Int(i64::from_le_bytes(word())),
            AttrType::Uint => Variant::Uint(u64::from_le_bytes(word())),
            AttrType::Addr => Variant::Addr(u64::from_le_bytes(word())),
            AttrType::Double => Variant::Double(f64::from_le_bytes(word())),
            AttrType::Bool => Variant::Bool(bytes[0] != 0),
            AttrType::Type => {
                Variant::Type(AttrType::from_code(bytes[0]).ok_or_else(|| Error::InvalidValue {
                    ty,
                    value: format!("{:#x}", bytes[0]),
                })?)
            }
        })
    }

    /// Reads a value from its textual form.
    ///
    /// Addresses are hexadecimal (with or without a `0x` prefix), user data is a
    /// `:`-separated list of hexadecimal bytes.
    pub fn parse(ty: AttrType, s: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidValue {
            ty,
            value: s.to_owned(),
        };
        let t = s.trim();
        Ok(match ty {
            AttrType::Inv => Variant::Empty,
            AttrType::String => Variant::string(s),
            AttrType::Usr => Variant::usr(
                t.split(':')
                    .filter(|b| !b.is_empty())
                    .map(|b| u8::from_str_radix(b.trim(), 16))
                    .collect::<Result<Vec<u8>, _>>()
                    .map_err(|_| invalid())?,
            ),
            AttrType::Int => Variant::Int(t.parse().map_err(|_| invalid())?),
            AttrType::Uint => Variant::Uint(t.parse().map_err(|_| invalid())?),
            AttrType::Addr => {
                let digits = t
                    .strip_prefix("0x")
                    .or_else(|| t.strip_prefix("0X"))
                    .unwrap_or(t);
                Variant::Addr(u64::from_str_radix(digits, 16).map_err(|_| invalid())?)
            }
            AttrType::Double => Variant::Double(t.parse().map_err(|_| invalid())?),
            AttrType::Bool => match t {
                "true" => Variant::Bool(true),
                "false" => Variant::Bool(false),
                n => Variant::Bool(n.parse::<i64>().map_err(|_| invalid())? != 0),
            },
            AttrType::Type => Variant::Type(t.parse()?),
        })
    }

    pub fn to_int(&self) -> Option<i64> {
        match *self {
            Variant::Int(i) => Some(i),
            Variant::Uint(u) | Variant::Addr(u) => i64::try_from(u).ok(),
            Variant::Bool(b) => Some(i64::from(b)),
            _ => None,
        }
    }

    pub fn to_uint(&self) -> Option<u64> {
        match *self {
            Variant::Uint(u) | Variant::Addr(u) => Some(u),
            Variant::Int(i) => u64::try_from(i).ok(),
            Variant::Bool(b) => Some(u64::from(b)),
            _ => None,
        }
    }

    pub fn to_double(&self) -> Option<f64> {
        match *self {
            Variant::Double(d) => Some(d),
            Variant::Int(i) => Some(i as f64),
            Variant::Uint(u) => Some(u as f64),
            _ => None,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match *self {
            Variant::Bool(b) => Some(b),
            Variant::Int(i) => Some(i != 0),
            Variant::Uint(u) => Some(u != 0),
            _ => None,
        }
    }

    pub fn to_attr_type(&self) -> Option<AttrType> {
        match *self {
            Variant::Type(t) => Some(t),
            _ => None,
        }
    }

    /// Raw payload of string and user values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::Usr(b) | Variant::String(b) => Some(&b[..]),
            _ => None,
        }
    }

    pub fn to_str(&self) -> Option<Cow<'_, str>> {
        match self {
            Variant::String(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    pub fn as_view(&self) -> VariantRef<'_> {
        match self {
            Variant::Empty => VariantRef::Empty,
            Variant::Usr(b) => VariantRef::Usr(b),
            Variant::Int(i) => VariantRef::Int(*i),
            Variant::Uint(u) => VariantRef::Uint(*u),
            Variant::String(b) => VariantRef::String(b),
            Variant::Addr(a) => VariantRef::Addr(*a),
            Variant::Double(d) => VariantRef::Double(*d),
            Variant::Bool(b) => VariantRef::Bool(*b),
            Variant::Type(t) => VariantRef::Type(*t),
        }
    }
}

// Doubles compare and hash by bit pattern so values can key the context tree.
impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Empty, Variant::Empty) => true,
            (Variant::Usr(a), Variant::Usr(b)) | (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Uint(a), Variant::Uint(b)) | (Variant::Addr(a), Variant::Addr(b)) => a == b,
            (Variant::Double(a), Variant::Double(b)) => a.to_bits() == b.to_bits(),
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Type(a), Variant::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Variant {}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty().hash(state);
        match self {
            Variant::Empty => {}
            Variant::Usr(b) | Variant::String(b) => b.hash(state),
            Variant::Int(i) => i.hash(state),
            Variant::Uint(u) | Variant::Addr(u) => u.hash(state),
            Variant::Double(d) => d.to_bits().hash(state),
            Variant::Bool(b) => b.hash(state),
            Variant::Type(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_view().fmt(f)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v.into())
    }
}

impl From<u64> for Variant {
    fn from(v: u64) -> Self {
        Variant::Uint(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::Uint(v.into())
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<AttrType> for Variant {
    fn from(v: AttrType) -> Self {
        Variant::Type(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::string(v)
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(Arc::from(v.into_bytes()))
    }
}

/// A borrowed view of a [`Variant`].
///
/// Payload slices may point into short-lived storage such as a
/// [`MemoryPool`](crate::pool::MemoryPool); converting into a [`Variant`]
/// copies them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum VariantRef<'a> {
    Empty,
    Usr(&'a [u8]),
    Int(i64),
    Uint(u64),
    String(&'a [u8]),
    Addr(u64),
    Double(f64),
    Bool(bool),
    Type(AttrType),
}

impl<'a> VariantRef<'a> {
    pub fn string(s: &'a str) -> Self {
        VariantRef::String(s.as_bytes())
    }

    pub fn ty(&self) -> AttrType {
        match self {
            VariantRef::Empty => AttrType::Inv,
            VariantRef::Usr(_) => AttrType::Usr,
            VariantRef::Int(_) => AttrType::Int,
            VariantRef::Uint(_) => AttrType::Uint,
            VariantRef::String(_) => AttrType::String,
            VariantRef::Addr(_) => AttrType::Addr,
            VariantRef::Double(_) => AttrType::Double,
            VariantRef::Bool(_) => AttrType::Bool,
            VariantRef::Type(_) => AttrType::Type,
        }
    }
}

impl From<VariantRef<'_>> for Variant {
    fn from(v: VariantRef<'_>) -> Self {
        match v {
            VariantRef::Empty => Variant::Empty,
            VariantRef::Usr(b) => Variant::usr(b),
            VariantRef::Int(i) => Variant::Int(i),
            VariantRef::Uint(u) => Variant::Uint(u),
            VariantRef::String(b) => Variant::string(b),
            VariantRef::Addr(a) => Variant::Addr(a),
            VariantRef::Double(d) => Variant::Double(d),
            VariantRef::Bool(b) => Variant::Bool(b),
            VariantRef::Type(t) => Variant::Type(t),
        }
    }
}

impl fmt::Display for VariantRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantRef::Empty => Ok(()),
            VariantRef::Usr(bytes) => {
                for b in bytes.iter() {
                    write!(f, "{b:x}:")?;
                }
                Ok(())
            }
            VariantRef::Int(i) => write!(f, "{i}"),
            VariantRef::Uint(u) => write!(f, "{u}"),
            VariantRef::String(b) => f.write_str(&String::from_utf8_lossy(b)),
            VariantRef::Addr(a) => write!(f, "{a:x}"),
            VariantRef::Double(d) => write!(f, "{d}"),
            VariantRef::Bool(b) => write!(f, "{b}"),
            VariantRef::Type(t) => write!(f, "{t}"),
        }
    }
}
