use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use flowable_core::{FlowableError, FlowableResult};
use flowable_engine_common::CommandExecutor;

use super::commands::{AcquireLockCmd, GetLockCmd, ReleaseLockCmd};
use super::store::LockRecord;

/// One named lock, taken and released on behalf of one owner.
///
/// Every call runs as its own top-level command. A lost acquisition race
/// counts as "not acquired"; how often to try again is up to the caller
/// (see [`LockManager::wait_for_lock`]).
#[derive(Debug, Clone)]
pub struct LockManager {
    executor: CommandExecutor,
    name: String,
    owner: String,
}

impl LockManager {
    pub fn new(
        executor: CommandExecutor,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            name: name.into(),
            owner: owner.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn acquire(&self) -> FlowableResult<bool> {
        match self.executor.execute(AcquireLockCmd::new(&self.name, &self.owner)) {
            Err(e) if e.is_optimistic_locking() => {
                debug!(lock = %self.name, owner = %self.owner, error = %e, "lost lock race");
                Ok(false)
            }
            other => other,
        }
    }

    pub fn release(&self) -> FlowableResult<bool> {
        self.executor.execute(ReleaseLockCmd::new(&self.name, &self.owner))
    }

    pub fn holder(&self) -> FlowableResult<Option<LockRecord>> {
        self.executor.execute(GetLockCmd::new(&self.name))
    }

    pub fn is_locked(&self) -> FlowableResult<bool> {
        Ok(self.holder()?.is_some())
    }

    /// Try to acquire every `poll_interval` until it succeeds or `timeout`
    /// has passed.
    pub fn wait_for_lock(&self, poll_interval: Duration, timeout: Duration) -> FlowableResult<()> {
        if poll_interval.is_zero() {
            return Err(FlowableError::illegal_argument("lock poll interval must be positive"));
        }

        let started = Instant::now();
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            if self.acquire()? {
                info!(lock = %self.name, owner = %self.owner, attempts, "lock acquired");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(FlowableError::illegal_state(format!(
                    "could not acquire lock {} within {timeout:?} ({attempts} attempts)",
                    self.name
                )));
            }
            thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }
}
