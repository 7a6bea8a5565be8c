//! # Overview
//!
//! An in-process annotation runtime. Instrumented code pushes and pops
//! `(attribute, value)` pairs onto per-thread context stacks; snapshots
//! capture the current context of the calling thread as a compact record.
//!
//! * Attributes are registered once by name and get dense ids
//! * Context is stored in a shared, append-only tree deduplicated on
//!   `(parent, attribute, value)`, so a snapshot only needs to reference the
//!   innermost node of its path
//! * Plugins hook into the extension points of [`Events`] to enrich snapshots
//!   or receive finished records
//!
//! # Snapshot Entries
//!
//! * Reference: a tree node, standing for its whole root-to-leaf path
//! * Immediate: an inline `(attribute, value)` pair, used for attributes with
//!   the `AS_VALUE` or `NOMERGE` property, global values and plugin output
//!
//! # Services
//!
//! * `symbollookup`: adds `source.file#<attr>`, `source.line#<attr>` and
//!   `source.function#<attr>` for configured address attributes
//!
//! # Configuration
//!
//! [`RuntimeConfig`] deserializes from kebab-case keys and can be overlaid with
//! `CALI_*` environment variables, see [`RuntimeConfig::load_merge_with_env`].
#![deny(warnings, clippy::all)]

pub mod attribute;
pub mod caliper;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod pool;
pub mod prelude;
pub mod record;
pub mod registry;
pub mod services;
pub mod snapshot;
pub mod tracing;
pub mod tree;
pub mod types;
pub mod variant;
pub use crate::attribute::Attribute;
pub use crate::caliper::{Caliper, Lifecycle};
pub use crate::config::{RuntimeConfig, SymbolLookupConfig};
pub use crate::entry::Entry;
pub use crate::error::{CallbackError, Error};
pub use crate::events::{EventKind, Events};
pub use crate::pool::MemoryPool;
pub use crate::record::RecordMap;
pub use crate::registry::AttributeStore;
pub use crate::services::{ServiceRegistry, SymbolLookup, SymbolTable};
pub use crate::snapshot::{LevelBuffer, SnapshotRecord};
pub use crate::tree::{ContextTree, Node};
pub use crate::types::{AttrProperties, AttrType, Id, NodeId};
pub use crate::variant::{Variant, VariantRef};
