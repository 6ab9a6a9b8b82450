use std::sync::Arc;

use tracing::{debug, warn};

use flowable_core::{FlowableError, FlowableResult};
use flowable_engine_common::Session;

use super::store::{LockRecord, LockStore};

#[derive(Debug, Clone)]
enum LockChange {
    Acquire(LockRecord),
    Release(LockRecord),
}

impl LockChange {
    fn name(&self) -> &str {
        match self {
            LockChange::Acquire(record) | LockChange::Release(record) => &record.name,
        }
    }
}

/// Session view of the lock table.
///
/// Acquisitions and releases are staged and only written to the store when
/// the command context flushes, so a failed command leaves the table
/// untouched. Losing an acquisition race at flush time is reported as an
/// optimistic-locking failure and every change already written by this
/// flush is undone. The same undo runs on `rollback`, when the context fails
/// after this session flushed.
pub struct LockSession {
    store: Arc<dyn LockStore>,
    staged: Vec<LockChange>,
    flushed: Vec<LockChange>,
}

impl LockSession {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            staged: Vec::new(),
            flushed: Vec::new(),
        }
    }

    /// Factory closure for `EngineBuilder::session_factory`.
    pub fn factory(
        store: Arc<dyn LockStore>,
    ) -> impl Fn() -> FlowableResult<LockSession> + Send + Sync + 'static {
        move || Ok(LockSession::new(store.clone()))
    }

    /// The lock as this session sees it: the store plus staged changes.
    pub fn current(&self, name: &str) -> FlowableResult<Option<LockRecord>> {
        let stored = self.store.get(name)?;
        Ok(self
            .staged
            .iter()
            .filter(|change| change.name() == name)
            .fold(stored, |_, change| match change {
                LockChange::Acquire(record) => Some(record.clone()),
                LockChange::Release(_) => None,
            }))
    }

    /// Stage taking lock `name` for `owner`. Returns false when the lock is
    /// already held, by anyone.
    pub fn acquire(&mut self, name: &str, owner: &str) -> FlowableResult<bool> {
        if self.current(name)?.is_some() {
            return Ok(false);
        }
        self.staged.push(LockChange::Acquire(LockRecord::new(name, owner)));
        Ok(true)
    }

    /// Stage releasing lock `name`. Returns false unless `owner` holds it.
    pub fn release(&mut self, name: &str, owner: &str) -> FlowableResult<bool> {
        match self.current(name)? {
            Some(record) if record.owner == owner => {
                self.staged.push(LockChange::Release(record));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn pending_changes(&self) -> usize {
        self.staged.len()
    }

    fn apply(&self, change: &LockChange) -> FlowableResult<()> {
        match change {
            LockChange::Acquire(record) => {
                if !self.store.insert_if_absent(record.clone())? {
                    return Err(FlowableError::optimistic_locking(format!(
                        "lock {} was acquired concurrently",
                        record.name
                    )));
                }
                debug!(lock = %record.name, owner = %record.owner, "lock acquired");
            }
            LockChange::Release(record) => {
                if self.store.remove(&record.name, &record.owner)? {
                    debug!(lock = %record.name, owner = %record.owner, "lock released");
                } else {
                    warn!(
                        lock = %record.name,
                        owner = %record.owner,
                        "lock was already gone at release"
                    );
                }
            }
        }
        Ok(())
    }

    fn undo(&self, applied: &[LockChange]) {
        for change in applied.iter().rev() {
            let undone = match change {
                LockChange::Acquire(record) => self.store.remove(&record.name, &record.owner),
                LockChange::Release(record) => self.store.insert_if_absent(record.clone()),
            };
            if let Err(e) = undone {
                warn!(lock = change.name(), error = %e, "failed to undo lock change");
            }
        }
    }
}

impl Session for LockSession {
    fn flush(&mut self) -> FlowableResult<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut applied = Vec::with_capacity(staged.len());

        for change in staged {
            if let Err(e) = self.apply(&change) {
                self.undo(&applied);
                return Err(e);
            }
            applied.push(change);
        }
        self.flushed = applied;
        Ok(())
    }

    fn rollback(&mut self) -> FlowableResult<()> {
        let flushed = std::mem::take(&mut self.flushed);
        if !flushed.is_empty() {
            debug!(undone = flushed.len(), "flushed lock changes rolled back");
            self.undo(&flushed);
        }
        Ok(())
    }

    fn close(&mut self) -> FlowableResult<()> {
        self.flushed.clear();
        if !self.staged.is_empty() {
            debug!(discarded = self.staged.len(), "unflushed lock changes discarded");
            self.staged.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::store::InMemoryLockStore;

    fn session(store: &Arc<InMemoryLockStore>) -> LockSession {
        LockSession::new(store.clone())
    }

    #[test]
    fn changes_reach_the_store_only_on_flush() {
        let store = Arc::new(InMemoryLockStore::new());
        let mut locks = session(&store);

        assert!(locks.acquire("timer", "node-a").unwrap());
        assert!(!locks.acquire("timer", "node-b").unwrap());
        assert!(store.is_empty());

        locks.flush().unwrap();
        assert_eq!(store.get("timer").unwrap().map(|r| r.owner).as_deref(), Some("node-a"));
    }

    #[test]
    fn close_without_flush_discards_staged_changes() {
        let store = Arc::new(InMemoryLockStore::new());
        let mut locks = session(&store);
        locks.acquire("timer", "node-a").unwrap();

        locks.close().unwrap();
        assert_eq!(locks.pending_changes(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn release_requires_ownership() {
        let store = Arc::new(InMemoryLockStore::new());
        store.insert_if_absent(LockRecord::new("timer", "node-a")).unwrap();
        let mut locks = session(&store);

        assert!(!locks.release("timer", "node-b").unwrap());
        assert!(locks.release("timer", "node-a").unwrap());
        assert!(locks.current("timer").unwrap().is_none());

        locks.flush().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn rollback_undoes_the_last_flush() {
        let store = Arc::new(InMemoryLockStore::new());
        store.insert_if_absent(LockRecord::new("old", "node-a")).unwrap();
        let mut locks = session(&store);
        locks.acquire("timer", "node-a").unwrap();
        locks.release("old", "node-a").unwrap();
        locks.flush().unwrap();
        assert!(store.get("old").unwrap().is_none());

        locks.rollback().unwrap();
        assert!(store.get("timer").unwrap().is_none());
        assert_eq!(store.get("old").unwrap().map(|r| r.owner).as_deref(), Some("node-a"));

        locks.rollback().unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lost_race_is_an_optimistic_locking_failure_and_undoes_the_flush() {
        let store = Arc::new(InMemoryLockStore::new());
        let mut first = session(&store);
        let mut second = session(&store);

        assert!(first.acquire("a", "node-1").unwrap());
        assert!(second.acquire("b", "node-2").unwrap());
        assert!(second.acquire("a", "node-2").unwrap());
        first.flush().unwrap();

        let err = second.flush().unwrap_err();
        assert!(err.is_optimistic_locking());
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
