use std::any::{Any, TypeId};
use std::collections::HashMap;

use tracing::trace;

use flowable_core::{FlowableError, FlowableResult};
use flowable_engine_common::Session;

/// Per-context cache of loaded entities, keyed by entity type and id.
///
/// Lives as long as its command context: nested commands reusing the
/// context see the same entries, a new context starts empty.
#[derive(Default)]
pub struct EntityCache {
    entries: HashMap<(TypeId, String), Box<dyn Any>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `entity`, returning the entry it replaced.
    pub fn put<T: Any>(&mut self, id: impl Into<String>, entity: T) -> Option<T> {
        let previous = self.entries.insert((TypeId::of::<T>(), id.into()), Box::new(entity))?;
        previous.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn find<T: Any>(&self, id: &str) -> Option<&T> {
        self.entries.get(&(TypeId::of::<T>(), id.to_owned()))?.downcast_ref::<T>()
    }

    pub fn find_mut<T: Any>(&mut self, id: &str) -> Option<&mut T> {
        self.entries.get_mut(&(TypeId::of::<T>(), id.to_owned()))?.downcast_mut::<T>()
    }

    /// Like [`find`](Self::find), but a miss is an error.
    pub fn get<T: Any>(&self, id: &str) -> FlowableResult<&T> {
        self.find::<T>(id).ok_or_else(|| {
            let object_type = std::any::type_name::<T>();
            FlowableError::not_found_of(
                object_type,
                format!("no {object_type} with id {id} is cached"),
            )
        })
    }

    /// Every cached entity of type `T`, in id order.
    pub fn find_all<T: Any>(&self) -> Vec<&T> {
        let mut found: Vec<(&str, &T)> = self
            .entries
            .iter()
            .filter(|((type_id, _), _)| *type_id == TypeId::of::<T>())
            .filter_map(|((_, id), entity)| Some((id.as_str(), entity.downcast_ref::<T>()?)))
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found.into_iter().map(|(_, entity)| entity).collect()
    }

    pub fn remove<T: Any>(&mut self, id: &str) -> Option<T> {
        let entity = self.entries.remove(&(TypeId::of::<T>(), id.to_owned()))?;
        entity.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Session for EntityCache {
    fn close(&mut self) -> FlowableResult<()> {
        trace!(entries = self.entries.len(), "entity cache cleared");
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Deployment {
        name: &'static str,
    }

    #[derive(Debug, PartialEq)]
    struct Job(u32);

    #[test]
    fn entries_are_scoped_by_type_and_id() {
        let mut cache = EntityCache::new();
        cache.put("1", Deployment { name: "order" });
        cache.put("1", Job(7));

        assert_eq!(cache.find::<Deployment>("1").map(|d| d.name), Some("order"));
        assert_eq!(cache.find::<Job>("1"), Some(&Job(7)));
        assert!(cache.find::<Job>("2").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn put_replaces_and_remove_takes() {
        let mut cache = EntityCache::new();
        assert!(cache.put("1", Job(1)).is_none());
        assert_eq!(cache.put("1", Job(2)), Some(Job(1)));

        cache.find_mut::<Job>("1").unwrap().0 = 3;
        assert_eq!(cache.remove::<Job>("1"), Some(Job(3)));
        assert!(cache.is_empty());
    }

    #[test]
    fn find_all_returns_one_type_in_id_order() {
        let mut cache = EntityCache::new();
        cache.put("b", Deployment { name: "second" });
        cache.put("a", Deployment { name: "first" });
        cache.put("c", Job(1));

        let names: Vec<_> = cache.find_all::<Deployment>().iter().map(|d| d.name).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn get_reports_a_miss_as_not_found() {
        let cache = EntityCache::new();
        let err = cache.get::<Job>("9").unwrap_err();
        assert!(matches!(err, FlowableError::ObjectNotFound { object_type: Some(_), .. }));
    }

    #[test]
    fn close_clears_everything() {
        let mut cache = EntityCache::new();
        cache.put("1", Job(1));
        cache.close().unwrap();
        assert!(cache.is_empty());
    }
}
