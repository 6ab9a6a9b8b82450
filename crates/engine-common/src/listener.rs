use std::sync::Arc;

use flowable_core::FlowableResult;

use crate::context::CommandContext;

/// Observer of a command context's teardown.
///
/// Hooks run in this order while the context closes:
///
/// 1. `closing`: always, before sessions are flushed. May still use the
///    context (open sessions, register further listeners).
/// 2. `after_sessions_flush`: only when no exception is recorded and the
///    flush succeeded.
/// 3. `closed`: only when the context is still free of exceptions.
/// 4. `close_failure`: only when an exception is recorded; read it through
///    [`CommandContext::exception`].
///
/// An error returned from a hook is recorded as the context exception (the
/// first recorded exception always wins).
pub trait CommandContextCloseListener {
    fn closing(&self, _ctx: &mut CommandContext) -> FlowableResult<()> {
        Ok(())
    }

    fn after_sessions_flush(&self, _ctx: &mut CommandContext) -> FlowableResult<()> {
        Ok(())
    }

    fn closed(&self, _ctx: &CommandContext) -> FlowableResult<()> {
        Ok(())
    }

    fn close_failure(&self, _ctx: &CommandContext) {}
}

impl<L> CommandContextCloseListener for Arc<L>
where
    L: CommandContextCloseListener + ?Sized,
{
    fn closing(&self, ctx: &mut CommandContext) -> FlowableResult<()> {
        (**self).closing(ctx)
    }

    fn after_sessions_flush(&self, ctx: &mut CommandContext) -> FlowableResult<()> {
        (**self).after_sessions_flush(ctx)
    }

    fn closed(&self, ctx: &CommandContext) -> FlowableResult<()> {
        (**self).closed(ctx)
    }

    fn close_failure(&self, ctx: &CommandContext) {
        (**self).close_failure(ctx)
    }
}
