use flowable_core::FlowableResult;
use flowable_engine_common::{Command, CommandContext};

use super::session::LockSession;
use super::store::LockRecord;

/// Take lock `name` for `owner`. Yields false when the lock is already held.
#[derive(Debug, Clone)]
pub struct AcquireLockCmd {
    pub name: String,
    pub owner: String,
}

impl AcquireLockCmd {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

impl Command for AcquireLockCmd {
    type Output = bool;

    fn execute(&self, ctx: &mut CommandContext) -> FlowableResult<bool> {
        ctx.session::<LockSession>()?.acquire(&self.name, &self.owner)
    }
}

/// Release lock `name`. Yields false unless `owner` held it.
#[derive(Debug, Clone)]
pub struct ReleaseLockCmd {
    pub name: String,
    pub owner: String,
}

impl ReleaseLockCmd {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

impl Command for ReleaseLockCmd {
    type Output = bool;

    fn execute(&self, ctx: &mut CommandContext) -> FlowableResult<bool> {
        ctx.session::<LockSession>()?.release(&self.name, &self.owner)
    }
}

/// Look up the current holder of lock `name`.
#[derive(Debug, Clone)]
pub struct GetLockCmd {
    pub name: String,
}

impl GetLockCmd {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Command for GetLockCmd {
    type Output = Option<LockRecord>;

    fn execute(&self, ctx: &mut CommandContext) -> FlowableResult<Option<LockRecord>> {
        ctx.session::<LockSession>()?.current(&self.name)
    }
}
