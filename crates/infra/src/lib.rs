//! In-memory infrastructure for the command engine: transactions, entity
//! caching and named locks.

pub mod cache;
pub mod lock;
pub mod transaction;


pub use cache::EntityCache;
pub use lock::{
    AcquireLockCmd, InMemoryLockStore, LockManager, LockRecord, LockSession, LockStore,
    ReleaseLockCmd,
};
pub use transaction::{InMemoryTransactionManager, TransactionStats};
