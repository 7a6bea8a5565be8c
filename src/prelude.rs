pub use crate::attribute::Attribute;
pub use crate::caliper::Caliper;
pub use crate::config::RuntimeConfig;
pub use crate::entry::Entry;
pub use crate::error::{CallbackError, Error};
pub use crate::events::CallbackResult;
pub use crate::services::{ServiceRegistry, SourceLocation, SymbolLookup, SymbolResolver};
pub use crate::snapshot::{LevelBuffer, SnapshotRecord};
pub use crate::types::{AttrProperties, AttrType, Id, NodeId};
pub use crate::variant::{Variant, VariantRef};
