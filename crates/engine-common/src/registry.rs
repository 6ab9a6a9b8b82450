use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use crate::engine::Engine;

/// Named engines living in one process.
///
/// Clones share the same table. Nothing here is global: whoever builds the
/// engines owns the registry and passes it where lookups are needed.
#[derive(Debug, Clone, Default)]
pub struct EngineRegistry {
    engines: Arc<RwLock<HashMap<String, Arc<Engine>>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `engine` under its name, returning the engine it replaced.
    pub fn register(&self, engine: Arc<Engine>) -> Option<Arc<Engine>> {
        let name = engine.name().to_owned();
        let previous = self.write().insert(name.clone(), engine);
        match &previous {
            Some(_) => warn!(engine = %name, "replaced an already registered engine"),
            None => info!(engine = %name, "engine registered"),
        }
        previous
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Engine>> {
        let removed = self.write().remove(name);
        if removed.is_some() {
            info!(engine = %name, "engine unregistered");
        }
        removed
    }

    /// Unregister `engine`, but only if it is the engine currently
    /// registered under its name. Returns whether it was removed.
    pub fn unregister_engine(&self, engine: &Engine) -> bool {
        let mut engines = self.write();
        let registered = engines
            .get(engine.name())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), engine));
        if !registered {
            return false;
        }
        engines.remove(engine.name());
        info!(engine = %engine.name(), "engine unregistered");
        true
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Engine>> {
        self.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Engine>>> {
        self.engines.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Engine>>> {
        self.engines.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use flowable_core::CommandConfig;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::EngineBuilder;

    fn engine(name: &str) -> Arc<Engine> {
        let config = EngineConfig {
            name: name.to_owned(),
            command: CommandConfig::new().transaction_not_supported(),
            ..Default::default()
        };
        Arc::new(EngineBuilder::new(config).build().unwrap())
    }

    #[test]
    fn register_lookup_and_unregister() {
        let registry = EngineRegistry::new();
        assert!(registry.register(engine("bpmn")).is_none());
        assert!(registry.register(engine("cmmn")).is_none());

        assert_eq!(registry.names(), ["bpmn", "cmmn"]);
        assert_eq!(registry.lookup("bpmn").unwrap().name(), "bpmn");
        assert!(registry.lookup("dmn").is_none());

        assert!(registry.unregister("bpmn").is_some());
        assert!(registry.unregister("bpmn").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_engine_checks_identity() {
        let registry = EngineRegistry::new();
        let stale = engine("bpmn");
        let current = engine("bpmn");
        registry.register(stale.clone());
        registry.register(current.clone());

        assert!(!registry.unregister_engine(&stale));
        assert!(registry.lookup("bpmn").is_some());
        assert!(registry.unregister_engine(&current));
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_the_table() {
        let registry = EngineRegistry::new();
        let other = registry.clone();
        assert!(registry.register(engine("bpmn")).is_none());
        assert!(other.register(engine("bpmn")).is_some());

        other.clear();
        assert!(registry.is_empty());
    }
}
