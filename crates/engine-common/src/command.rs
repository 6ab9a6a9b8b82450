use core::any::Any;
use core::fmt;
use core::marker::PhantomData;

use flowable_core::FlowableResult;

use crate::context::CommandContext;

/// Type-erased value returned through the interceptor chain.
pub type CommandOutput = Box<dyn Any>;

/// A unit of work executed under one command context.
///
/// Commands are plain values built by the calling service (a deployment id,
/// a lock name, ...). `execute` may run more than once when a retrying
/// interceptor is configured, so it takes `&self` and must not rely on
/// consuming its own state.
///
/// The context is passed explicitly: anything the command needs (sessions,
/// the agenda, the executor for nested calls) is reached through it.
pub trait Command {
    type Output: 'static;

    fn execute(&self, ctx: &mut CommandContext) -> FlowableResult<Self::Output>;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// Object-safe view of a [`Command`], used by interceptors.
pub trait ErasedCommand {
    fn command_name(&self) -> &str;

    fn execute_erased(&self, ctx: &mut CommandContext) -> FlowableResult<CommandOutput>;
}

impl<C> ErasedCommand for C
where
    C: Command,
{
    fn command_name(&self) -> &str {
        Command::name(self)
    }

    fn execute_erased(&self, ctx: &mut CommandContext) -> FlowableResult<CommandOutput> {
        let output = self.execute(ctx)?;
        Ok(Box::new(output))
    }
}

/// A command backed by a closure.
pub struct FnCommand<F, T> {
    name: &'static str,
    f: F,
    _output: PhantomData<fn() -> T>,
}

/// Build a command from a closure.
///
/// ```ignore
/// let answer = executor.execute(command_fn("answer", |_ctx| Ok(42)))?;
/// ```
pub fn command_fn<T, F>(name: &'static str, f: F) -> FnCommand<F, T>
where
    F: Fn(&mut CommandContext) -> FlowableResult<T>,
{
    FnCommand {
        name,
        f,
        _output: PhantomData,
    }
}

impl<F, T> Command for FnCommand<F, T>
where
    F: Fn(&mut CommandContext) -> FlowableResult<T>,
    T: 'static,
{
    type Output = T;

    fn execute(&self, ctx: &mut CommandContext) -> FlowableResult<T> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F, T> fmt::Debug for FnCommand<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand").field("name", &self.name).finish()
    }
}

/// `my_crate::cmd::DeployCmd<T>` becomes `DeployCmd`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = core::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeployCmd;

    impl Command for DeployCmd {
        type Output = ();

        fn execute(&self, _ctx: &mut CommandContext) -> FlowableResult<()> {
            Ok(())
        }
    }

    #[test]
    fn default_name_is_the_short_type_name() {
        assert_eq!(Command::name(&DeployCmd), "DeployCmd");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn closure_commands_keep_their_name() {
        let cmd = command_fn("answer", |_ctx| Ok(42));
        assert_eq!(cmd.command_name(), "answer");
    }
}
