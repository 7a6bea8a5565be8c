//! Pluggable services started by [`Caliper::init`](crate::Caliper::init).

use crate::caliper::Caliper;
use crate::error::Error;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub mod symbollookup;

pub use symbollookup::{SourceLocation, SymbolLookup, SymbolResolver, SymbolTable};

/// A started service instance, retrievable with [`Caliper::service`].
pub type ServiceHandle = Arc<dyn Any + Send + Sync>;

/// Starts a service against a runtime, usually by connecting callbacks.
///
/// `Ok(None)` means the service has nothing to do with the current
/// configuration and stays out of the runtime.
pub type ServiceFactory =
    Box<dyn Fn(&Caliper) -> Result<Option<ServiceHandle>, Error> + Send + Sync>;

/// Named service factories, started in registration order.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: Vec<(String, ServiceFactory)>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory. A later registration under the same name replaces the
    /// earlier one but keeps its position.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Caliper) -> Result<Option<ServiceHandle>, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        let factory: ServiceFactory = Box::new(factory);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((name, factory)),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &ServiceFactory)> + '_ {
        self.entries.iter().map(|(n, f)| (n.as_str(), f))
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::types::{AttrProperties, AttrType};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    fn counting_registry() -> ServiceRegistry {
        ServiceRegistry::new()
            .register("counter", |c: &Caliper| {
                let counter = Arc::new(Counter(AtomicUsize::new(0)));
                let inner = counter.clone();
                c.events().create_attr.connect(move |_, _| {
                    inner.0.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                Ok(Some(counter as ServiceHandle))
            })
            .register("idle", |_: &Caliper| Ok(None))
            .register("broken", |_: &Caliper| {
                Err(Error::Service {
                    name: "broken".to_owned(),
                    reason: "no backend".to_owned(),
                })
            })
    }

    #[test]
    fn registry_keeps_order_and_replaces() {
        let reg = counting_registry().register("idle", |_: &Caliper| Ok(None));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["counter", "idle", "broken"]);
        assert_eq!(reg.len(), 3);
        assert!(reg.contains("broken"));
        assert!(!reg.contains("csv"));
    }

    #[test]
    fn init_starts_enabled_services() {
        let c = Caliper::with_services(RuntimeConfig::default(), counting_registry());
        c.init().unwrap();
        assert_eq!(c.service_names(), vec!["counter"]);

        c.create_attribute("a", AttrType::Int, AttrProperties::DEFAULT);
        c.create_attribute("a", AttrType::Int, AttrProperties::DEFAULT);
        let counter = c.service::<Counter>("counter").unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(c.service::<String>("counter").is_none());
        assert!(c.service::<Counter>("idle").is_none());
    }

    #[test]
    fn disabled_services_are_not_started() {
        let cfg = RuntimeConfig {
            services: vec!["idle".to_owned(), "missing".to_owned()],
            ..Default::default()
        };
        let c = Caliper::with_services(cfg, counting_registry());
        c.init().unwrap();
        assert!(c.service_names().is_empty());
        assert!(c.events().create_attr.is_empty());
    }
}
