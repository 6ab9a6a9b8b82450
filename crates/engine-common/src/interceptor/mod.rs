//! Command interceptor chain.
//!
//! Every command travels through an ordered list of interceptors before it
//! reaches the command invoker at the end of the chain:
//!
//! ```text
//! CommandExecutor::execute
//!   ↓
//! LogInterceptor            (span + start/finish logging)
//!   ↓
//! RetryInterceptor          (optional; optimistic-locking retries)
//!   ↓
//! TransactionInterceptor    (begin / commit / rollback)
//!   ↓
//! CommandContextInterceptor (reuse the caller's context or open a new one)
//!   ↓
//! CommandInvoker            (execute the command, drain the agenda)
//! ```
//!
//! An interceptor receives the [`Invocation`] plus a [`Next`] handle for the
//! rest of the chain, and decides whether, when and how often to call it.
//! Because the rest of the chain is just a value, every interceptor can be
//! tested against a stub invoker.
//!
//! The chain is built once at engine configuration time and never changes.

mod context;
mod debug;
mod invoker;
mod log;
mod retry;
mod transaction;

use std::fmt;
use std::sync::Arc;

use flowable_core::{CommandConfig, FlowableError, FlowableResult};

use crate::command::{CommandOutput, ErasedCommand};
use crate::context::CommandContext;
use crate::executor::CommandExecutor;

pub use context::CommandContextInterceptor;
pub use debug::{DebugCommandInvoker, DebuggerHandle};
pub use invoker::CommandInvoker;
pub use log::LogInterceptor;
pub use retry::{BackoffStrategy, RetryInterceptor, RetryPolicy};
pub use transaction::{Transaction, TransactionInterceptor, TransactionManager};

/// One cross-cutting wrapper around command execution.
pub trait CommandInterceptor: Send + Sync {
    /// Name used when the chain is printed.
    fn name(&self) -> &'static str {
        crate::command::short_type_name::<Self>()
    }

    fn execute(&self, invocation: Invocation<'_>, next: Next<'_>)
    -> FlowableResult<CommandOutput>;
}

/// A command on its way through the chain.
///
/// Before the context interceptor, `context` is the caller's context (present
/// only for nested calls). From the context interceptor on, it is the
/// context the command executes in.
pub struct Invocation<'a> {
    config: CommandConfig,
    command: &'a dyn ErasedCommand,
    context: Option<&'a mut CommandContext>,
    executor: &'a CommandExecutor,
    transaction_active: bool,
}

impl<'a> Invocation<'a> {
    pub fn new(
        config: CommandConfig,
        command: &'a dyn ErasedCommand,
        context: Option<&'a mut CommandContext>,
        executor: &'a CommandExecutor,
    ) -> Self {
        let transaction_active = context
            .as_deref()
            .is_some_and(CommandContext::is_transaction_active);
        Self {
            config,
            command,
            context,
            executor,
            transaction_active,
        }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    pub fn command(&self) -> &'a dyn ErasedCommand {
        self.command
    }

    pub fn command_name(&self) -> &'a str {
        self.command.command_name()
    }

    pub fn context(&self) -> Option<&CommandContext> {
        self.context.as_deref()
    }

    pub fn context_mut(&mut self) -> Option<&mut CommandContext> {
        self.context.as_deref_mut()
    }

    /// True when the command was issued from inside another command.
    pub fn is_nested(&self) -> bool {
        self.context.is_some()
    }

    pub fn executor(&self) -> &'a CommandExecutor {
        self.executor
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    pub fn set_transaction_active(&mut self, active: bool) {
        self.transaction_active = active;
    }

    /// Borrow this invocation again, so the rest of the chain can be called
    /// more than once.
    pub fn reborrow(&mut self) -> Invocation<'_> {
        Invocation {
            config: self.config,
            command: self.command,
            context: self.context.as_deref_mut(),
            executor: self.executor,
            transaction_active: self.transaction_active,
        }
    }

    /// The same invocation, now executing in `context`.
    pub fn with_context<'b>(&self, context: &'b mut CommandContext) -> Invocation<'b>
    where
        'a: 'b,
    {
        Invocation {
            config: self.config,
            command: self.command,
            context: Some(context),
            executor: self.executor,
            transaction_active: self.transaction_active,
        }
    }
}

/// The remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'c> {
    rest: &'c [Arc<dyn CommandInterceptor>],
}

impl<'c> Next<'c> {
    pub fn new(rest: &'c [Arc<dyn CommandInterceptor>]) -> Self {
        Self { rest }
    }

    /// Hand the invocation to the next interceptor.
    pub fn proceed(self, invocation: Invocation<'_>) -> FlowableResult<CommandOutput> {
        match self.rest.split_first() {
            Some((head, rest)) => head.execute(invocation, Next { rest }),
            None => Err(FlowableError::configuration(
                "interceptor chain ended without a command invoker",
            )),
        }
    }

    pub fn is_end(&self) -> bool {
        self.rest.is_empty()
    }
}

/// Ordered, immutable list of interceptors ending in a command invoker.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
}

impl InterceptorChain {
    pub fn builder() -> InterceptorChainBuilder {
        InterceptorChainBuilder::default()
    }

    pub fn first(&self) -> Next<'_> {
        Next::new(&self.interceptors)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Default)]
pub struct InterceptorChainBuilder {
    interceptors: Vec<Arc<dyn CommandInterceptor>>,
    invoker: Option<Arc<dyn CommandInterceptor>>,
}

impl InterceptorChainBuilder {
    /// Append an interceptor (runs after the ones already added).
    pub fn with(mut self, interceptor: impl CommandInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_all(
        mut self,
        interceptors: impl IntoIterator<Item = Arc<dyn CommandInterceptor>>,
    ) -> Self {
        self.interceptors.extend(interceptors);
        self
    }

    /// The terminal interceptor. Must not call `next`.
    pub fn invoker(mut self, invoker: impl CommandInterceptor + 'static) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn shared_invoker(mut self, invoker: Arc<dyn CommandInterceptor>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn build(self) -> FlowableResult<InterceptorChain> {
        let invoker = self.invoker.ok_or_else(|| {
            FlowableError::configuration("interceptor chain needs a command invoker")
        })?;
        let mut interceptors = self.interceptors;
        interceptors.push(invoker);
        Ok(InterceptorChain { interceptors })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_fn;

    struct Tag(&'static str, Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl CommandInterceptor for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn execute(
            &self,
            invocation: Invocation<'_>,
            next: Next<'_>,
        ) -> FlowableResult<CommandOutput> {
            self.1.lock().unwrap().push(self.0);
            next.proceed(invocation)
        }
    }

    #[test]
    fn interceptors_run_in_insertion_order_then_the_invoker() {
        let trail = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = InterceptorChain::builder()
            .with(Tag("a", trail.clone()))
            .with(Tag("b", trail.clone()))
            .invoker(Tag("end", trail.clone()))
            .build()
            .unwrap();
        assert_eq!(chain.names(), ["a", "b", "end"]);

        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));
        let err = chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, None, &executor))
            .err()
            .unwrap();

        // The "end" tag forwards past the end of the chain.
        assert!(err.is_configuration());
        assert_eq!(*trail.lock().unwrap(), ["a", "b", "end"]);
    }

    #[test]
    fn chain_without_invoker_is_rejected() {
        let err = InterceptorChain::builder().with(LogInterceptor::new()).build().unwrap_err();
        assert!(err.is_configuration());
    }
}
