//! Extension points for plugins.
//!
//! Each extension point keeps an ordered list of callbacks. Firing runs them
//! synchronously on the calling thread, in registration order, and stops at the
//! first failure. The list is copied out (a reference count bump) before
//! dispatch, so a callback may itself connect callbacks or create attributes.

use crate::attribute::Attribute;
use crate::caliper::Caliper;
use crate::error::{CallbackError, Error};
use crate::snapshot::SnapshotRecord;
use derive_more::Display;
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type CallbackResult = Result<(), CallbackError>;

pub type CreateAttrFn = dyn Fn(&Caliper, &Attribute) -> CallbackResult + Send + Sync;
pub type LifecycleFn = dyn Fn(&Caliper) -> CallbackResult + Send + Sync;
pub type PreFlushFn = dyn Fn(&Caliper, &mut SnapshotRecord) -> CallbackResult + Send + Sync;
pub type ProcessSnapshotFn = dyn Fn(&Caliper, &SnapshotRecord) -> CallbackResult + Send + Sync;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum EventKind {
    #[display(fmt = "attribute-created")]
    CreateAttribute,
    #[display(fmt = "post-init")]
    PostInit,
    #[display(fmt = "pre-flush-snapshot")]
    PreFlushSnapshot,
    #[display(fmt = "process-snapshot")]
    ProcessSnapshot,
    #[display(fmt = "finish")]
    Finish,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::CreateAttribute,
        EventKind::PostInit,
        EventKind::PreFlushSnapshot,
        EventKind::ProcessSnapshot,
        EventKind::Finish,
    ];
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.to_string() == s)
            .ok_or_else(|| format!("unknown event '{s}'"))
    }
}

/// The ordered callback list of one extension point.
pub struct Signal<F: ?Sized> {
    kind: EventKind,
    callbacks: RwLock<Arc<[Arc<F>]>>,
}

impl<F: ?Sized> Signal<F> {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            callbacks: RwLock::new(Arc::from(Vec::new())),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, cb: Arc<F>) {
        let mut callbacks = self.callbacks.write();
        let mut next: Vec<Arc<F>> = callbacks.iter().cloned().collect();
        next.push(cb);
        *callbacks = Arc::from(next);
    }

    fn current(&self) -> Arc<[Arc<F>]> {
        self.callbacks.read().clone()
    }

    fn dispatch(&self, mut call: impl FnMut(&F) -> CallbackResult) -> Result<(), Error> {
        for cb in self.current().iter() {
            call(&**cb).map_err(|source| Error::Callback {
                event: self.kind,
                source,
            })?;
        }
        Ok(())
    }
}

impl<F: ?Sized> fmt::Debug for Signal<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("kind", &self.kind)
            .field("callbacks", &self.len())
            .finish()
    }
}

impl Signal<CreateAttrFn> {
    pub fn connect<C>(&self, cb: C)
    where
        C: Fn(&Caliper, &Attribute) -> CallbackResult + Send + Sync + 'static,
    {
        let cb: Arc<CreateAttrFn> = Arc::new(cb);
        self.push(cb);
    }

    pub fn fire(&self, c: &Caliper, attr: &Attribute) -> Result<(), Error> {
        self.dispatch(|cb| cb(c, attr))
    }
}

impl Signal<LifecycleFn> {
    pub fn connect<C>(&self, cb: C)
    where
        C: Fn(&Caliper) -> CallbackResult + Send + Sync + 'static,
    {
        let cb: Arc<LifecycleFn> = Arc::new(cb);
        self.push(cb);
    }

    pub fn fire(&self, c: &Caliper) -> Result<(), Error> {
        self.dispatch(|cb| cb(c))
    }
}

impl Signal<PreFlushFn> {
    pub fn connect<C>(&self, cb: C)
    where
        C: Fn(&Caliper, &mut SnapshotRecord) -> CallbackResult + Send + Sync + 'static,
    {
        let cb: Arc<PreFlushFn> = Arc::new(cb);
        self.push(cb);
    }

    pub fn fire(&self, c: &Caliper, snapshot: &mut SnapshotRecord) -> Result<(), Error> {
        self.dispatch(|cb| cb(c, &mut *snapshot))
    }
}

impl Signal<ProcessSnapshotFn> {
    pub fn connect<C>(&self, cb: C)
    where
        C: Fn(&Caliper, &SnapshotRecord) -> CallbackResult + Send + Sync + 'static,
    {
        let cb: Arc<ProcessSnapshotFn> = Arc::new(cb);
        self.push(cb);
    }

    pub fn fire(&self, c: &Caliper, snapshot: &SnapshotRecord) -> Result<(), Error> {
        self.dispatch(|cb| cb(c, snapshot))
    }
}

/// All extension points of one runtime.
#[derive(Debug)]
pub struct Events {
    /// Fired after a genuinely new attribute was registered.
    pub create_attr: Signal<CreateAttrFn>,
    /// Fired once after services were started.
    pub post_init: Signal<LifecycleFn>,
    /// Fired for every snapshot, with the record still open for additions.
    pub pre_flush_snapshot: Signal<PreFlushFn>,
    /// Fired with every finalized record produced by `push_snapshot`.
    pub process_snapshot: Signal<ProcessSnapshotFn>,
    /// Fired once at shutdown.
    pub finish: Signal<LifecycleFn>,
}

impl Events {
    pub fn new() -> Self {
        Self {
            create_attr: Signal::new(EventKind::CreateAttribute),
            post_init: Signal::new(EventKind::PostInit),
            pre_flush_snapshot: Signal::new(EventKind::PreFlushSnapshot),
            process_snapshot: Signal::new(EventKind::ProcessSnapshot),
            finish: Signal::new(EventKind::Finish),
        }
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}
