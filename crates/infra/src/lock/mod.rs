//! Named locks shared by every context of an engine.
//!
//! A lock is a row in a [`LockStore`], inserted only if absent. Commands
//! touch it through the [`LockSession`], which stages changes until the
//! context flushes. Callers usually go through a [`LockManager`].

pub mod commands;
pub mod manager;
pub mod session;
pub mod store;

pub use commands::{AcquireLockCmd, GetLockCmd, ReleaseLockCmd};
pub use manager::LockManager;
pub use session::LockSession;
pub use store::{InMemoryLockStore, LockRecord, LockStore};
