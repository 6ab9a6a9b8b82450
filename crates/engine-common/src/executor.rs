use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use flowable_core::{CommandConfig, FlowableError, FlowableResult};

use crate::command::{Command, CommandOutput};
use crate::context::CommandContext;
use crate::interceptor::{InterceptorChain, Invocation};

/// Entry point for running commands.
///
/// Cheap to clone; every clone shares the same interceptor chain. A command
/// context keeps a clone so commands can issue nested commands through
/// [`CommandExecutor::execute_nested`].
#[derive(Clone)]
pub struct CommandExecutor {
    chain: Arc<InterceptorChain>,
    default_config: CommandConfig,
}

impl CommandExecutor {
    pub fn new(chain: InterceptorChain, default_config: CommandConfig) -> Self {
        Self {
            chain: Arc::new(chain),
            default_config,
        }
    }

    pub fn default_config(&self) -> &CommandConfig {
        &self.default_config
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Run a top-level command with the default config.
    pub fn execute<C: Command>(&self, command: C) -> FlowableResult<C::Output> {
        self.execute_with(self.default_config, command)
    }

    pub fn execute_with<C: Command>(
        &self,
        config: CommandConfig,
        command: C,
    ) -> FlowableResult<C::Output> {
        self.dispatch(config, &command, None)
    }

    /// Run `command` from inside the command that owns `ctx`.
    ///
    /// With the default config the nested command shares `ctx`: its sessions,
    /// agenda and transaction. Its failure is returned here and is not
    /// recorded on `ctx`, so the caller may recover from it.
    pub fn execute_nested<C: Command>(
        &self,
        ctx: &mut CommandContext,
        command: C,
    ) -> FlowableResult<C::Output> {
        self.execute_nested_with(self.default_config, ctx, command)
    }

    pub fn execute_nested_with<C: Command>(
        &self,
        config: CommandConfig,
        ctx: &mut CommandContext,
        command: C,
    ) -> FlowableResult<C::Output> {
        self.dispatch(config, &command, Some(ctx))
    }

    fn dispatch<C: Command>(
        &self,
        config: CommandConfig,
        command: &C,
        ambient: Option<&mut CommandContext>,
    ) -> FlowableResult<C::Output> {
        let invocation = Invocation::new(config, command, ambient, self);
        let output = self.chain.first().proceed(invocation)?;
        downcast_output::<C::Output>(output, command.name())
    }
}

fn downcast_output<T: 'static>(output: CommandOutput, command: &str) -> FlowableResult<T> {
    output.downcast::<T>().map(|value| *value).map_err(|_| {
        FlowableError::illegal_state(format!(
            "command {command} produced a value that is not a {}",
            type_name::<T>()
        ))
    })
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("chain", &self.chain)
            .field("default_config", &self.default_config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_fn;
    use crate::interceptor::{CommandContextInterceptor, CommandInvoker, LogInterceptor};
    use crate::session::SessionFactories;

    fn executor() -> CommandExecutor {
        let chain = InterceptorChain::builder()
            .with(LogInterceptor::new())
            .with(CommandContextInterceptor::new(SessionFactories::new()))
            .invoker(CommandInvoker::new())
            .build()
            .unwrap();
        CommandExecutor::new(chain, CommandConfig::default())
    }

    #[test]
    fn returns_the_typed_command_result() {
        let answer = executor().execute(command_fn("answer", |_ctx| Ok(42_i64))).unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn nested_command_sees_the_outer_context() {
        let outer_id = executor()
            .execute(command_fn("outer", |ctx: &mut CommandContext| {
                let inner_id = ctx
                    .command_executor()?
                    .execute_nested(ctx, command_fn("inner", |ctx: &mut CommandContext| {
                        assert!(ctx.is_reused());
                        Ok(ctx.id())
                    }))?;
                assert_eq!(inner_id, ctx.id());
                assert!(!ctx.is_reused());
                Ok(ctx.id())
            }))
            .unwrap();

        assert_eq!(outer_id.to_string().len(), 36);
    }

    #[test]
    fn result_type_mismatch_is_an_illegal_state() {
        let err = downcast_output::<String>(Box::new(1_u8), "mismatch").unwrap_err();
        assert!(matches!(err, FlowableError::IllegalState(msg) if msg.contains("mismatch")));
    }
}
