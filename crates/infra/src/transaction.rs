//! In-memory transaction manager.
//!
//! There is no shared store to coordinate, so a transaction here is only a
//! bracket with an id: sessions stage their changes and apply them when the
//! context flushes. The manager counts what happened, which is what tests
//! and benchmarks assert on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use flowable_core::{FlowableResult, TransactionId};
use flowable_engine_common::{Transaction, TransactionManager};

/// Snapshot of a manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

impl TransactionStats {
    /// Transactions begun but not yet committed or rolled back.
    pub fn active(&self) -> u64 {
        self.begun - self.committed - self.rolled_back
    }
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionManager {
    counters: Arc<Counters>,
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
        }
    }
}

impl TransactionManager for InMemoryTransactionManager {
    fn begin(&self) -> FlowableResult<Box<dyn Transaction>> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        let tx = InMemoryTransaction {
            id: TransactionId::new(),
            started_at: Utc::now(),
            counters: self.counters.clone(),
        };
        debug!(transaction_id = %tx.id, "transaction begun");
        Ok(Box::new(tx))
    }
}

struct InMemoryTransaction {
    id: TransactionId,
    started_at: DateTime<Utc>,
    counters: Arc<Counters>,
}

impl InMemoryTransaction {
    fn elapsed_us(&self) -> i64 {
        (Utc::now() - self.started_at).num_microseconds().unwrap_or(i64::MAX)
    }
}

impl Transaction for InMemoryTransaction {
    fn commit(self: Box<Self>) -> FlowableResult<()> {
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        debug!(transaction_id = %self.id, elapsed_us = self.elapsed_us(), "transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) -> FlowableResult<()> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        debug!(
            transaction_id = %self.id,
            elapsed_us = self.elapsed_us(),
            "transaction rolled back"
        );
        Ok(())
    }
}
