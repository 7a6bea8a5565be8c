//! The runtime facade.
//!
//! A [`Caliper`] owns the attribute registry, the context tree, the extension
//! points and the started services. Context stacks are per thread and per
//! runtime instance; several independent runtimes can coexist in one process.

use crate::attribute::Attribute;
use crate::config::RuntimeConfig;
use crate::entry::Entry;
use crate::error::Error;
use crate::events::Events;
use crate::registry::AttributeStore;
use crate::services::{ServiceHandle, ServiceRegistry};
use crate::snapshot::SnapshotRecord;
use crate::tree::{ContextTree, Node};
use crate::types::{AttrProperties, AttrType, Id, NodeId};
use crate::variant::Variant;
use derive_more::Display;
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(0);

// A thread's entry for a runtime is removed once it pops its last frame, so
// pooled threads do not keep stacks of runtimes they no longer annotate.
thread_local! {
    static STACKS: RefCell<HashMap<u64, ContextStack>> = RefCell::new(HashMap::new());
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
#[repr(u8)]
pub enum Lifecycle {
    #[display(fmt = "uninitialized")]
    Uninitialized,
    #[display(fmt = "initialized")]
    Initialized,
    #[display(fmt = "running")]
    Running,
    #[display(fmt = "finishing")]
    Finishing,
    #[display(fmt = "terminated")]
    Terminated,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Lifecycle::Uninitialized,
            1 => Lifecycle::Initialized,
            2 => Lifecycle::Running,
            3 => Lifecycle::Finishing,
            _ => Lifecycle::Terminated,
        }
    }
}

#[derive(Clone, Debug)]
enum Frame {
    Node(NodeId),
    Immediate { attribute: Id, value: Variant },
}

/// One thread's annotation stack for one runtime.
#[derive(Debug, Default)]
struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    fn top_node(&self) -> NodeId {
        self.frames
            .iter()
            .rev()
            .find_map(|f| match f {
                Frame::Node(id) => Some(*id),
                Frame::Immediate { .. } => None,
            })
            .unwrap_or(NodeId::ROOT)
    }
}

pub struct Caliper {
    id: u64,
    config: RuntimeConfig,
    state: AtomicU8,
    attributes: AttributeStore,
    tree: ContextTree,
    events: Events,
    globals: RwLock<BTreeMap<Id, Variant>>,
    registry: ServiceRegistry,
    services: RwLock<Vec<(String, ServiceHandle)>>,
}

impl Caliper {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_services(config, ServiceRegistry::new())
    }

    /// Creates a runtime that starts the services of `registry` on [`Caliper::init`].
    pub fn with_services(config: RuntimeConfig, registry: ServiceRegistry) -> Self {
        Self {
            id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
            config,
            state: AtomicU8::new(Lifecycle::Uninitialized as u8),
            attributes: AttributeStore::new(),
            tree: ContextTree::new(),
            events: Events::new(),
            globals: RwLock::default(),
            registry,
            services: RwLock::default(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    pub fn attribute_store(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, op: &'static str, from: &[Lifecycle], to: Lifecycle) -> Result<(), Error> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let state = Lifecycle::from_u8(current);
            if !from.contains(&state) {
                return Err(Error::InvalidState { op, state });
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(runtime = self.id, from = %state, to = %to, "Lifecycle transition");
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Starts the enabled services and fires post-init.
    ///
    /// A service that fails to start is logged and left out; the others still run.
    pub fn init(&self) -> Result<(), Error> {
        self.transition("initialize", &[Lifecycle::Uninitialized], Lifecycle::Initialized)?;

        for name in self.config.services.iter() {
            if !self.registry.contains(name) {
                warn!(service = %name, "Requested service is not registered");
            }
        }

        for (name, factory) in self.registry.iter() {
            if !self.config.service_enabled(name) {
                debug!(service = %name, "Service not enabled");
                continue;
            }
            match factory(self) {
                Ok(Some(instance)) => {
                    info!(service = %name, "Registered service");
                    self.services.write().push((name.to_owned(), instance));
                }
                Ok(None) => info!(service = %name, "Service declined to start"),
                Err(e) => warn!(service = %name, error = %e, "Service failed to start"),
            }
        }

        if let Err(e) = self.events.post_init.fire(self) {
            warn!(error = %e, "post-init dispatch aborted");
        }
        self.transition("run", &[Lifecycle::Initialized], Lifecycle::Running)
    }

    /// Fires finish and terminates the runtime.
    pub fn finish(&self) -> Result<(), Error> {
        self.transition(
            "finish",
            &[Lifecycle::Initialized, Lifecycle::Running],
            Lifecycle::Finishing,
        )?;
        if let Err(e) = self.events.finish.fire(self) {
            warn!(error = %e, "finish dispatch aborted");
        }
        self.transition("terminate", &[Lifecycle::Finishing], Lifecycle::Terminated)
    }

    /// The instance handle of a started service.
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.services
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, handle)| handle.clone().downcast::<T>().ok())
    }

    /// Names of the started services, in start order.
    pub fn service_names(&self) -> Vec<String> {
        self.services.read().iter().map(|(n, _)| n.clone()).collect()
    }

    //
    // --- attributes
    //

    /// Returns the attribute called `name`, creating it on first use.
    ///
    /// attribute-created fires only when this call created the attribute.
    pub fn create_attribute(
        &self,
        name: &str,
        ty: AttrType,
        properties: AttrProperties,
    ) -> Attribute {
        let (attr, created) = self.attributes.create_or_get(name, ty, properties);
        if created {
            debug!(id = %attr.id(), name, %ty, "Created attribute");
            if let Err(e) = self.events.create_attr.fire(self, &attr) {
                warn!(attribute = name, error = %e, "attribute-created dispatch aborted");
            }
        }
        attr
    }

    pub fn get_attribute(&self, name: &str) -> Attribute {
        self.attributes.get_by_name(name)
    }

    pub fn get_attribute_by_id(&self, id: Id) -> Attribute {
        self.attributes.get(id)
    }

    pub fn foreach_attribute(&self, mut f: impl FnMut(&Attribute)) {
        for a in self.attributes.attributes().iter() {
            f(a)
        }
    }

    pub fn foreach_node(&self, mut f: impl FnMut(&Node)) {
        for n in self.tree.nodes().iter() {
            f(n)
        }
    }

    //
    // --- context
    //

    fn with_stack<R>(&self, f: impl FnOnce(&mut ContextStack) -> R) -> R {
        STACKS.with(|stacks| f(stacks.borrow_mut().entry(self.id).or_default()))
    }

    /// Reads the calling thread's stack without creating one.
    fn peek_stack<R>(&self, f: impl FnOnce(&ContextStack) -> R) -> Option<R> {
        STACKS.with(|stacks| stacks.borrow().get(&self.id).map(f))
    }

    /// Pushes `(attr, value)` onto the calling thread's context stack.
    ///
    /// Tree attributes resolve to the child of the current top node; as-value
    /// and no-merge attributes are kept as immediate entries. Returns the new
    /// top entry, or [`Entry::Empty`] for the invalid attribute.
    pub fn push_context(&self, attr: &Attribute, value: impl Into<Variant>) -> Entry {
        if !attr.is_valid() {
            debug!("Ignoring context push of the invalid attribute");
            return Entry::Empty;
        }
        let value = value.into();

        if attr.is_immediate() {
            let entry = Entry::Immediate {
                attribute: attr.id(),
                value: value.clone(),
            };
            self.with_stack(|s| {
                s.frames.push(Frame::Immediate {
                    attribute: attr.id(),
                    value,
                })
            });
            return entry;
        }

        let parent = self.current_node();
        match self.tree.get_or_make_child(parent, attr, value) {
            Some(node) => {
                self.with_stack(|s| s.frames.push(Frame::Node(node.id())));
                Entry::Reference(node.id())
            }
            None => Entry::Empty,
        }
    }

    /// Pops the innermost context entry of the calling thread.
    ///
    /// Tree nodes are never removed; only the thread's cursor moves. Returns
    /// false if the stack was empty.
    pub fn pop_context(&self) -> bool {
        STACKS.with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let Some(stack) = stacks.get_mut(&self.id) else {
                return false;
            };
            let popped = stack.frames.pop().is_some();
            if stack.frames.is_empty() {
                stacks.remove(&self.id);
            }
            popped
        })
    }

    /// The calling thread's innermost tree node, the root if none was pushed.
    pub fn current_node(&self) -> NodeId {
        self.peek_stack(|s| s.top_node()).unwrap_or(NodeId::ROOT)
    }

    /// Sets a value carried by every snapshot of every thread.
    pub fn set_global(&self, attr: &Attribute, value: impl Into<Variant>) {
        if !attr.is_valid() {
            return;
        }
        if !attr.is_global() {
            debug!(attribute = attr.name(), "Setting a global value on a non-global attribute");
        }
        self.globals.write().insert(attr.id(), value.into());
    }

    //
    // --- snapshots
    //

    /// Captures the calling thread's context into a new record.
    ///
    /// The record holds a reference to the current top node, the thread's
    /// immediate entries and the global values, followed by whatever pre-flush
    /// callbacks add. `filter` restricts immediate and global entries to the
    /// listed attributes. A failing pre-flush callback discards this record's
    /// enrichment unless `fatal-callback-errors` is set.
    pub fn capture_snapshot(&self, filter: Option<&[Attribute]>) -> Result<SnapshotRecord, Error> {
        self.capture(filter, &[])
    }

    /// Captures a snapshot with `trigger` entries and hands the finished record
    /// to the process-snapshot callbacks.
    pub fn push_snapshot(&self, trigger: &[(Attribute, Variant)]) -> Result<SnapshotRecord, Error> {
        let rec = self.capture(None, trigger)?;
        if let Err(e) = self.events.process_snapshot.fire(self, &rec) {
            if self.config.fatal_callback_errors {
                return Err(e);
            }
            warn!(error = %e, "process-snapshot dispatch aborted");
        }
        Ok(rec)
    }

    fn capture(
        &self,
        filter: Option<&[Attribute]>,
        trigger: &[(Attribute, Variant)],
    ) -> Result<SnapshotRecord, Error> {
        let wanted = |id: Id| match filter {
            Some(f) => f.iter().any(|a| a.id() == id),
            None => true,
        };
        let mut rec = SnapshotRecord::with_capacity(self.config.snapshot_capacity);

        self.peek_stack(|s| {
            let top = s.top_node();
            if !top.is_root() {
                rec.append_reference(top);
            }
            for f in s.frames.iter() {
                if let Frame::Immediate { attribute, value } = f {
                    if wanted(*attribute) {
                        rec.append(Entry::Immediate {
                            attribute: *attribute,
                            value: value.clone(),
                        });
                    }
                }
            }
        });
        for (attribute, value) in self.globals.read().iter() {
            if wanted(*attribute) {
                rec.append(Entry::Immediate {
                    attribute: *attribute,
                    value: value.clone(),
                });
            }
        }
        for (attr, value) in trigger.iter().filter(|(a, _)| a.is_valid()) {
            rec.append_immediate(attr, value.clone());
        }

        // Callbacks may rewrite entries as well as append, so a failure
        // restores the whole record.
        let committed = (!self.events.pre_flush_snapshot.is_empty()).then(|| rec.clone());
        if let Err(e) = self.events.pre_flush_snapshot.fire(self, &mut rec) {
            if self.config.fatal_callback_errors {
                return Err(e);
            }
            warn!(error = %e, "Dropping snapshot enrichment");
            if let Some(committed) = committed {
                rec = committed;
            }
        }
        if rec.skipped() > 0 {
            debug!(
                skipped = rec.skipped(),
                capacity = rec.capacity(),
                "Snapshot record full"
            );
        }
        Ok(rec)
    }
}

impl Drop for Caliper {
    fn drop(&mut self) {
        // Stacks of other threads are removed when they pop their last
        // entry, or go away with those threads.
        let _ = STACKS.try_with(|stacks| {
            if let Ok(mut stacks) = stacks.try_borrow_mut() {
                stacks.remove(&self.id);
            }
        });
    }
}

impl fmt::Debug for Caliper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caliper")
            .field("id", &self.id)
            .field("state", &self.lifecycle())
            .field("attributes", &self.attributes.len())
            .field("nodes", &self.tree.len())
            .field("services", &self.service_names())
            .finish()
    }
}
