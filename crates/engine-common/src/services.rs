use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flowable_core::{FlowableError, FlowableResult};

struct Entry {
    name: &'static str,
    service: Arc<dyn Any + Send + Sync>,
}

/// Typed lookup of the services an engine exposes (one instance per type).
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<Entry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, replacing any earlier service of the same type.
    pub fn register<T: Any + Send + Sync>(&mut self, service: T) {
        self.register_shared(Arc::new(service));
    }

    pub fn register_shared<T: Any + Send + Sync>(&mut self, service: Arc<T>) {
        let entry = Entry {
            name: type_name::<T>(),
            service,
        };
        self.services.insert(TypeId::of::<T>(), Arc::new(entry));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> FlowableResult<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.service.clone().downcast::<T>().ok())
            .ok_or_else(|| {
                FlowableError::configuration(format!(
                    "no service of type {} is registered",
                    type_name::<T>()
                ))
            })
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.services.values().map(|e| e.name).collect();
        names.sort_unstable();
        f.debug_list().entries(names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RuntimeService {
        engine: &'static str,
    }

    #[test]
    fn services_are_looked_up_by_type() {
        let mut services = ServiceRegistry::new();
        services.register(RuntimeService { engine: "bpmn" });

        assert_eq!(services.get::<RuntimeService>().unwrap().engine, "bpmn");
        assert!(services.contains::<RuntimeService>());
        assert!(services.get::<String>().unwrap_err().is_configuration());
    }
}
