use tracing::trace;

use flowable_core::FlowableResult;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;
use crate::context::CommandContext;
use crate::session::SessionFactories;

/// Decides which command context the command runs in.
///
/// A nested invocation reuses the caller's context when its config allows
/// reuse and the caller's context has not failed. Everything else gets a
/// fresh context, which is closed here once the rest of the chain returns.
#[derive(Debug, Clone, Default)]
pub struct CommandContextInterceptor {
    session_factories: SessionFactories,
}

impl CommandContextInterceptor {
    pub fn new(session_factories: SessionFactories) -> Self {
        Self { session_factories }
    }

    pub fn session_factories(&self) -> &SessionFactories {
        &self.session_factories
    }
}

impl CommandInterceptor for CommandContextInterceptor {
    fn execute(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> FlowableResult<CommandOutput> {
        let reuse = invocation.config().is_context_reuse_possible()
            && invocation.context().is_some_and(|ambient| !ambient.has_exception());
        if reuse {
            let previous = match invocation.context_mut() {
                Some(ambient) => {
                    trace!(context_id = %ambient.id(), "reusing command context");
                    ambient.replace_reused(true)
                }
                None => false,
            };
            let result = next.proceed(invocation.reborrow());
            if let Some(ambient) = invocation.context_mut() {
                ambient.replace_reused(previous);
            }
            // The owner of the context decides what to do with the failure.
            return result;
        }

        let mut ctx =
            CommandContext::new(invocation.command_name(), self.session_factories.clone());
        ctx.set_transaction_active(invocation.is_transaction_active());
        ctx.set_command_executor(invocation.executor().clone());
        trace!(context_id = %ctx.id(), command = ctx.command_name(), "opened command context");

        let result = next.proceed(invocation.with_context(&mut ctx));
        let output = match result {
            Ok(output) => Some(output),
            Err(e) => {
                ctx.record_exception(e);
                None
            }
        };
        ctx.close()?;

        // close() only returns Ok when no exception was recorded.
        Ok(output.unwrap_or_else(|| Box::new(())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flowable_core::{CommandConfig, FlowableError};

    use super::*;
    use crate::command::command_fn;
    use crate::executor::CommandExecutor;
    use crate::interceptor::InterceptorChain;
    use crate::interceptor::testing::StubInvoker;
    use crate::session::SessionFactories;

    fn chain_with<F>(stub: Arc<StubInvoker<F>>) -> InterceptorChain
    where
        F: Fn(usize) -> FlowableResult<CommandOutput> + Send + Sync + 'static,
    {
        InterceptorChain::builder()
            .with(CommandContextInterceptor::new(SessionFactories::new()))
            .shared_invoker(stub)
            .build()
            .unwrap()
    }

    #[test]
    fn nested_call_reuses_the_ambient_context() {
        let stub = Arc::new(StubInvoker::new(|_call: usize| Ok(Box::new(()) as CommandOutput)));
        let chain = chain_with(stub.clone());
        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));
        let mut outer = CommandContext::new("outer", SessionFactories::new());

        chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, Some(&mut outer), &executor))
            .ok()
            .unwrap();

        assert_eq!(stub.seen.lock().unwrap()[0].context_reused, Some(true));
        assert!(!outer.is_reused());
        assert!(!outer.is_closed());
    }

    #[test]
    fn failed_or_non_reusable_ambient_gets_a_fresh_context() {
        let stub = Arc::new(StubInvoker::new(|_call: usize| Ok(Box::new(()) as CommandOutput)));
        let chain = chain_with(stub.clone());
        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));

        let mut outer = CommandContext::new("outer", SessionFactories::new());
        chain
            .first()
            .proceed(Invocation::new(
                CommandConfig::new().with_context_reuse_possible(false),
                &cmd,
                Some(&mut outer),
                &executor,
            ))
            .ok()
            .unwrap();

        outer.record_exception(FlowableError::illegal_state("earlier"));
        chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, Some(&mut outer), &executor))
            .ok()
            .unwrap();

        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen[0].context_reused, Some(false));
        assert_eq!(seen[1].context_reused, Some(false));
    }

    #[test]
    fn fresh_context_turns_the_failure_into_the_close_error() {
        let stub = Arc::new(StubInvoker::new(|_call: usize| {
            Err(FlowableError::not_found("task 7"))
        }));
        let chain = chain_with(stub);
        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));

        let err = chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, None, &executor))
            .err()
            .unwrap();

        assert!(matches!(err, FlowableError::ObjectNotFound { .. }));
        assert_eq!(err.to_string(), "task 7");
    }

    #[test]
    fn nested_failure_leaves_the_ambient_context_clean() {
        let stub = Arc::new(StubInvoker::new(|_call: usize| {
            Err(FlowableError::illegal_argument("nope"))
        }));
        let chain = chain_with(stub);
        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));
        let mut outer = CommandContext::new("outer", SessionFactories::new());

        let err = chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, Some(&mut outer), &executor))
            .err()
            .unwrap();

        assert!(matches!(err, FlowableError::IllegalArgument(_)));
        assert!(!outer.has_exception());
    }
}
