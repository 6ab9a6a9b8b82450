use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use flowable_core::{FlowableError, FlowableResult};

/// A held lock: who took it and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub name: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            acquired_at: Utc::now(),
        }
    }
}

/// Shared table of named locks.
pub trait LockStore: Send + Sync {
    /// Insert `record` unless its name is already taken. Returns whether the
    /// record was inserted.
    fn insert_if_absent(&self, record: LockRecord) -> FlowableResult<bool>;

    /// Remove the lock `name` if `owner` holds it. Returns whether a lock was
    /// removed.
    fn remove(&self, name: &str, owner: &str) -> FlowableResult<bool>;

    fn get(&self, name: &str) -> FlowableResult<Option<LockRecord>>;
}

impl<S> LockStore for Arc<S>
where
    S: LockStore + ?Sized,
{
    fn insert_if_absent(&self, record: LockRecord) -> FlowableResult<bool> {
        (**self).insert_if_absent(record)
    }

    fn remove(&self, name: &str, owner: &str) -> FlowableResult<bool> {
        (**self).remove(name, owner)
    }

    fn get(&self, name: &str) -> FlowableResult<Option<LockRecord>> {
        (**self).get(name)
    }
}

/// In-memory lock table for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    locks: RwLock<HashMap<String, LockRecord>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of held locks, also readable from a poisoned table.
    pub fn len(&self) -> usize {
        self.locks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> FlowableError {
    FlowableError::illegal_state("lock table poisoned")
}

impl LockStore for InMemoryLockStore {
    fn insert_if_absent(&self, record: LockRecord) -> FlowableResult<bool> {
        let mut locks = self.locks.write().map_err(|_| poisoned())?;
        if locks.contains_key(&record.name) {
            return Ok(false);
        }
        locks.insert(record.name.clone(), record);
        Ok(true)
    }

    fn remove(&self, name: &str, owner: &str) -> FlowableResult<bool> {
        let mut locks = self.locks.write().map_err(|_| poisoned())?;
        match locks.get(name) {
            Some(record) if record.owner == owner => {
                locks.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, name: &str) -> FlowableResult<Option<LockRecord>> {
        let locks = self.locks.read().map_err(|_| poisoned())?;
        Ok(locks.get(name).cloned())
    }
}
