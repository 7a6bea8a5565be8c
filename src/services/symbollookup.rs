//! Source location lookup for address attributes.
//!
//! For every configured address attribute `<name>` the service maintains
//! `source.file#<name>`, `source.line#<name>` and `source.function#<name>`,
//! and adds their values to each snapshot that carries addresses.

use crate::attribute::Attribute;
use crate::caliper::Caliper;
use crate::entry::Entry;
use crate::error::Error;
use crate::events::CallbackResult;
use crate::pool::MemoryPool;
use crate::services::ServiceHandle;
use crate::snapshot::{LevelBuffer, SnapshotRecord};
use crate::types::{AttrProperties, AttrType, Id};
use crate::variant::{Variant, VariantRef};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "symbollookup";

/// File name reported for addresses without debug information.
pub const UNKNOWN_FILE: &str = "UNKNOWN";

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SourceLocation {
    pub file: String,
    pub line: u64,
    pub function: Option<String>,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u64) -> Self {
        Self {
            file: file.into(),
            line,
            function: None,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

/// Maps instruction addresses to source locations.
pub trait SymbolResolver: Send + Sync {
    fn source_location(&self, addr: u64) -> Option<SourceLocation>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for Arc<R> {
    fn source_location(&self, addr: u64) -> Option<SourceLocation> {
        (**self).source_location(addr)
    }
}

/// A resolver backed by half-open address ranges.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    ranges: BTreeMap<u64, (u64, SourceLocation)>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `start..end` to `location`, replacing a range with the same start.
    pub fn insert(&mut self, start: u64, end: u64, location: SourceLocation) {
        self.ranges.insert(start, (end, location));
    }

    pub fn with_range(mut self, start: u64, end: u64, location: SourceLocation) -> Self {
        self.insert(start, end, location);
        self
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn source_location(&self, addr: u64) -> Option<SourceLocation> {
        self.ranges
            .range(..=addr)
            .next_back()
            .filter(|(_, (end, _))| addr < *end)
            .map(|(_, (_, loc))| loc.clone())
    }
}

#[derive(Clone, Debug)]
struct SymbolAttributes {
    file: Attribute,
    line: Attribute,
    function: Attribute,
}

pub struct SymbolLookup {
    addr_attr_names: Vec<String>,
    sym_attrs: Mutex<BTreeMap<Id, SymbolAttributes>>,
    resolver: Arc<dyn SymbolResolver>,
    num_lookups: AtomicU64,
    num_failed: AtomicU64,
}

impl SymbolLookup {
    /// A service factory resolving addresses through `resolver`.
    ///
    /// The address attributes come from the runtime's `symbollookup`
    /// configuration. Without any the service does not start.
    pub fn factory<R>(
        resolver: R,
    ) -> impl Fn(&Caliper) -> Result<Option<ServiceHandle>, Error> + Send + Sync + 'static
    where
        R: SymbolResolver + 'static,
    {
        let resolver: Arc<dyn SymbolResolver> = Arc::new(resolver);
        move |c: &Caliper| -> Result<Option<ServiceHandle>, Error> {
            let names = c.config().symbollookup.attributes.clone();
            if names.is_empty() {
                info!("No address attributes given for symbol lookup");
                return Ok(None);
            }
            let service = Arc::new(SymbolLookup {
                addr_attr_names: names,
                sym_attrs: Mutex::default(),
                resolver: resolver.clone(),
                num_lookups: AtomicU64::new(0),
                num_failed: AtomicU64::new(0),
            });
            service.register_callbacks(c);
            Ok(Some(service as ServiceHandle))
        }
    }

    fn register_callbacks(self: &Arc<Self>, c: &Caliper) {
        let events = c.events();

        let s = self.clone();
        events.post_init.connect(move |c| {
            for name in s.addr_attr_names.iter() {
                let attr = c.get_attribute(name);
                if attr.is_valid() {
                    s.check_attribute(c, &attr);
                }
            }
            Ok(())
        });

        let s = self.clone();
        events.create_attr.connect(move |c, attr| {
            s.check_attribute(c, attr);
            Ok(())
        });

        let s = self.clone();
        events
            .pre_flush_snapshot
            .connect(move |c, rec| s.process_snapshot(c, rec));

        let s = self.clone();
        events.finish.connect(move |c| {
            s.finish_log(c);
            Ok(())
        });
    }

    /// Number of address lookups performed.
    pub fn num_lookups(&self) -> u64 {
        self.num_lookups.load(Ordering::Relaxed)
    }

    /// Number of lookups that found no source location.
    pub fn num_failed(&self) -> u64 {
        self.num_failed.load(Ordering::Relaxed)
    }

    /// The file, line and function attributes derived from `addr_attr`.
    pub fn symbol_attributes(&self, addr_attr: &Attribute) -> Option<[Attribute; 3]> {
        self.sym_attrs
            .lock()
            .get(&addr_attr.id())
            .map(|s| [s.file.clone(), s.line.clone(), s.function.clone()])
    }

    fn check_attribute(&self, c: &Caliper, attr: &Attribute) {
        if !self.addr_attr_names.iter().any(|n| n == attr.name()) {
            return;
        }
        if self.sym_attrs.lock().contains_key(&attr.id()) {
            return;
        }

        // Created outside the lock; creation fires attribute-created again.
        let name = attr.name();
        let sym = SymbolAttributes {
            file: c.create_attribute(
                &format!("source.file#{name}"),
                AttrType::String,
                AttrProperties::DEFAULT,
            ),
            line: c.create_attribute(
                &format!("source.line#{name}"),
                AttrType::Uint,
                AttrProperties::DEFAULT,
            ),
            function: c.create_attribute(
                &format!("source.function#{name}"),
                AttrType::String,
                AttrProperties::DEFAULT,
            ),
        };
        debug!(attribute = name, "Tracking address attribute");
        self.sym_attrs.lock().entry(attr.id()).or_insert(sym);
    }

    fn process_snapshot(&self, c: &Caliper, rec: &mut SnapshotRecord) -> CallbackResult {
        // Local copy so lookups run without holding the map lock.
        let sym_map = self.sym_attrs.lock().clone();
        if sym_map.is_empty() {
            return Ok(());
        }

        let pool = MemoryPool::new();
        let mut levels = LevelBuffer::new();

        for (addr_id, sym) in sym_map.iter() {
            let addr_attr = c.get_attribute_by_id(*addr_id);
            match rec.get(c.tree(), &addr_attr) {
                Entry::Reference(node) => {
                    for n in c.tree().ancestors(node) {
                        if n.attribute() == *addr_id {
                            self.add_symbol_attributes(n.value(), sym, &pool, &mut levels);
                        }
                    }
                }
                Entry::Immediate { value, .. } => {
                    self.add_symbol_attributes(&value, sym, &pool, &mut levels)
                }
                Entry::Empty => {}
            }
        }

        if !levels.is_empty() {
            rec.append_levels(levels);
        }
        Ok(())
    }

    fn add_symbol_attributes<'p>(
        &self,
        addr: &Variant,
        sym: &SymbolAttributes,
        pool: &'p MemoryPool,
        levels: &mut LevelBuffer<'p>,
    ) {
        self.num_lookups.fetch_add(1, Ordering::Relaxed);
        let location = addr
            .to_uint()
            .and_then(|a| self.resolver.source_location(a));

        let (file, line, function) = match location {
            Some(loc) => (
                pool.alloc_str(&loc.file),
                loc.line,
                loc.function.as_deref().map(|f| pool.alloc_str(f)),
            ),
            None => {
                self.num_failed.fetch_add(1, Ordering::Relaxed);
                (UNKNOWN_FILE, 0, None)
            }
        };

        let mut level = vec![
            (sym.file.clone(), VariantRef::string(file)),
            (sym.line.clone(), VariantRef::Uint(line)),
        ];
        if let Some(f) = function {
            level.push((sym.function.clone(), VariantRef::string(f)));
        }
        levels.push_level(level);
    }

    fn finish_log(&self, c: &Caliper) {
        info!(
            lookups = self.num_lookups(),
            failed = self.num_failed(),
            "Performed address lookups"
        );

        let sym_attrs = self.sym_attrs.lock();
        if sym_attrs.len() == self.addr_attr_names.len() {
            return;
        }
        for name in self.addr_attr_names.iter() {
            let attr = c.get_attribute(name);
            if !attr.is_valid() || !sym_attrs.contains_key(&attr.id()) {
                warn!(attribute = %name, "Address attribute not found");
            }
        }
    }
}

impl std::fmt::Debug for SymbolLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolLookup")
            .field("attributes", &self.addr_attr_names)
            .field("lookups", &self.num_lookups())
            .field("failed", &self.num_failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeConfig, SymbolLookupConfig};
    use crate::services::ServiceRegistry;
    use crate::types::NodeId;
    use pretty_assertions::assert_eq;

    fn table() -> SymbolTable {
        SymbolTable::new()
            .with_range(0x1000, 0x1100, SourceLocation::new("outer.c", 10))
            .with_range(
                0x2000,
                0x2100,
                SourceLocation::new("inner.c", 20).with_function("kernel"),
            )
    }

    fn runtime(attributes: &[&str]) -> Caliper {
        let cfg = RuntimeConfig {
            symbollookup: SymbolLookupConfig {
                attributes: attributes.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        };
        let c = Caliper::with_services(
            cfg,
            ServiceRegistry::new().register(NAME, SymbolLookup::factory(table())),
        );
        c.init().unwrap();
        c
    }

    fn named(c: &Caliper, rec: &SnapshotRecord) -> Vec<(String, String)> {
        rec.unpack(c.tree())
            .into_iter()
            .map(|(id, v)| (c.get_attribute_by_id(id).name().to_owned(), v.to_string()))
            .collect()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_owned(), v.to_owned())
    }

    #[test]
    fn symbol_table_ranges() {
        let t = table();
        assert_eq!(t.len(), 2);
        assert_eq!(t.source_location(0x1000), Some(SourceLocation::new("outer.c", 10)));
        assert_eq!(t.source_location(0x10ff).map(|l| l.line), Some(10));
        assert_eq!(t.source_location(0x1100), None);
        assert_eq!(t.source_location(0xfff), None);
        assert_eq!(
            t.source_location(0x2004).and_then(|l| l.function),
            Some("kernel".to_owned())
        );
    }

    #[test]
    fn does_not_start_without_attributes() {
        let c = runtime(&[]);
        assert!(c.service::<SymbolLookup>(NAME).is_none());
        assert!(c.events().pre_flush_snapshot.is_empty());
    }

    #[test]
    fn creates_symbol_attributes_for_address_attributes() {
        let c = runtime(&["callpath.address"]);
        let svc = c.service::<SymbolLookup>(NAME).unwrap();
        assert!(!c.get_attribute("source.file#callpath.address").is_valid());

        let addr = c.create_attribute("callpath.address", AttrType::Addr, AttrProperties::DEFAULT);
        let [file, line, function] = svc.symbol_attributes(&addr).unwrap();
        assert_eq!(file.name(), "source.file#callpath.address");
        assert_eq!(file.ty(), AttrType::String);
        assert_eq!(line.name(), "source.line#callpath.address");
        assert_eq!(line.ty(), AttrType::Uint);
        assert_eq!(function.name(), "source.function#callpath.address");
        assert_eq!(function.ty(), AttrType::String);

        let other = c.create_attribute("function", AttrType::String, AttrProperties::DEFAULT);
        assert!(svc.symbol_attributes(&other).is_none());
    }

    #[test]
    fn picks_up_attributes_created_before_init() {
        let cfg = RuntimeConfig {
            symbollookup: SymbolLookupConfig {
                attributes: vec!["pc".to_owned()],
            },
            ..Default::default()
        };
        let c = Caliper::with_services(
            cfg,
            ServiceRegistry::new().register(NAME, SymbolLookup::factory(table())),
        );
        let pc = c.create_attribute("pc", AttrType::Addr, AttrProperties::AS_VALUE);
        c.init().unwrap();

        let svc = c.service::<SymbolLookup>(NAME).unwrap();
        assert!(svc.symbol_attributes(&pc).is_some());
    }

    #[test]
    fn nested_addresses_resolve_root_to_leaf() {
        let c = runtime(&["callpath.address"]);
        let addr = c.create_attribute("callpath.address", AttrType::Addr, AttrProperties::DEFAULT);
        c.push_context(&addr, Variant::addr(0x1004));
        c.push_context(&addr, Variant::addr(0x2008));

        let rec = c.capture_snapshot(None).unwrap();
        assert_eq!(
            named(&c, &rec),
            vec![
                pair("callpath.address", "1004"),
                pair("callpath.address", "2008"),
                pair("source.file#callpath.address", "outer.c"),
                pair("source.line#callpath.address", "10"),
                pair("source.file#callpath.address", "inner.c"),
                pair("source.line#callpath.address", "20"),
                pair("source.function#callpath.address", "kernel"),
            ]
        );
        // Enrichment is carried inline; the tree only holds the addresses.
        assert_eq!(c.tree().len(), 2);

        let svc = c.service::<SymbolLookup>(NAME).unwrap();
        assert_eq!(svc.num_lookups(), 2);
        assert_eq!(svc.num_failed(), 0);
    }

    #[test]
    fn unknown_addresses_count_as_failed() {
        let c = runtime(&["pc"]);
        let pc = c.create_attribute("pc", AttrType::Addr, AttrProperties::AS_VALUE);
        c.push_context(&pc, Variant::addr(0xdead));

        let rec = c.capture_snapshot(None).unwrap();
        assert_eq!(
            named(&c, &rec),
            vec![
                pair("pc", "dead"),
                pair("source.file#pc", "UNKNOWN"),
                pair("source.line#pc", "0"),
            ]
        );
        assert_eq!(c.current_node(), NodeId::ROOT);

        let svc = c.service::<SymbolLookup>(NAME).unwrap();
        assert_eq!((svc.num_lookups(), svc.num_failed()), (1, 1));
        c.finish().unwrap();
    }

    #[test]
    fn snapshots_without_addresses_are_untouched() {
        let c = runtime(&["callpath.address", "never.created"]);
        c.create_attribute("callpath.address", AttrType::Addr, AttrProperties::DEFAULT);
        let function = c.create_attribute("function", AttrType::String, AttrProperties::DEFAULT);
        c.push_context(&function, "main");

        let rec = c.capture_snapshot(None).unwrap();
        assert_eq!(named(&c, &rec), vec![pair("function", "main")]);
        assert_eq!(c.service::<SymbolLookup>(NAME).unwrap().num_lookups(), 0);
        c.finish().unwrap();
    }
}
