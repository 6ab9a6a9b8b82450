use tracing::{debug, trace};

use flowable_core::{FlowableError, FlowableResult};

use super::{CommandInterceptor, Invocation, Next};
use crate::agenda::Operation;
use crate::command::CommandOutput;
use crate::context::{CommandContext, ContextState};

/// Terminal interceptor: runs the command, then drains the agenda.
///
/// The command's return value is parked on the context's result stack while
/// the agenda drains, so operations can read or replace it. A nested command
/// reusing a context whose agenda already has work queued only executes;
/// the outer drain loop picks up whatever it plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandInvoker;

impl CommandInvoker {
    pub fn new() -> Self {
        Self
    }
}

impl CommandInterceptor for CommandInvoker {
    fn execute(
        &self,
        invocation: Invocation<'_>,
        _next: Next<'_>,
    ) -> FlowableResult<CommandOutput> {
        execute_and_drain(invocation, |_op, _ctx| {})
    }
}

/// Runs the command and the agenda, calling `before_operation` ahead of
/// every operation taken off the agenda.
///
/// On failure the result frames pushed and the operations planned by this
/// invocation are dropped; the context is left as it was found.
pub(super) fn execute_and_drain<G>(
    mut invocation: Invocation<'_>,
    before_operation: G,
) -> FlowableResult<CommandOutput>
where
    G: Fn(&dyn Operation, &CommandContext),
{
    let command = invocation.command();
    let ctx = invocation.context_mut().ok_or_else(|| {
        FlowableError::illegal_state(format!(
            "command {} reached the invoker without a command context",
            command.command_name()
        ))
    })?;

    let pending = ctx.agenda().len();
    let depth = ctx.result_depth();
    let result = if ctx.is_reused() && pending > 0 {
        command.execute_erased(ctx)
    } else {
        let previous = ctx.state();
        let result = run(|ctx| command.execute_erased(ctx), ctx, &before_operation);
        ctx.set_state(previous);
        result
    };

    if result.is_err() {
        ctx.truncate_results(depth);
        let discarded = ctx.agenda_mut().truncate_to(pending);
        if discarded > 0 {
            debug!(
                context_id = %ctx.id(),
                command = command.command_name(),
                discarded,
                "operations planned by a failed command discarded"
            );
        }
    }
    result
}

fn run<G>(
    execute: impl FnOnce(&mut CommandContext) -> FlowableResult<CommandOutput>,
    ctx: &mut CommandContext,
    before_operation: &G,
) -> FlowableResult<CommandOutput>
where
    G: Fn(&dyn Operation, &CommandContext),
{
    ctx.set_state(ContextState::ExecutingCommand);
    let output = execute(ctx)?;
    ctx.push_result(output)?;

    ctx.set_state(ContextState::DrainingAgenda);
    while !ctx.agenda().is_empty() {
        let operation = ctx.agenda_mut().next_operation()?;
        before_operation(operation.as_ref(), ctx);
        trace!(context_id = %ctx.id(), operation = operation.name(), "executing operation");
        operation.run(ctx)?;
    }

    ctx.pop_result()
}
