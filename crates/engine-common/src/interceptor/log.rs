use std::time::Instant;

use tracing::{Level, debug, debug_span};

use flowable_core::FlowableResult;

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// Logs command start, finish and failure. Otherwise transparent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInterceptor;

impl LogInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandInterceptor for LogInterceptor {
    fn execute(&self, invocation: Invocation<'_>, next: Next<'_>) -> FlowableResult<CommandOutput> {
        if !invocation.config().is_logging_enabled() || !tracing::enabled!(Level::DEBUG) {
            return next.proceed(invocation);
        }

        let command = invocation.command_name();
        let nested = invocation.is_nested();
        let span = debug_span!("command", command, nested);
        let _entered = span.enter();

        debug!("--- starting {command} ---");
        let started = Instant::now();
        let result = next.proceed(invocation);
        let elapsed_us = started.elapsed().as_micros() as u64;

        match &result {
            Ok(_) => debug!(elapsed_us, "--- {command} finished ---"),
            Err(e) => debug!(elapsed_us, error = %e, "--- {command} failed ---"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use flowable_core::{CommandConfig, FlowableError};

    use super::*;
    use crate::command::command_fn;
    use crate::executor::CommandExecutor;
    use crate::interceptor::InterceptorChain;
    use crate::interceptor::testing::StubInvoker;

    #[test]
    fn passes_results_and_errors_through() {
        let chain = InterceptorChain::builder()
            .with(LogInterceptor::new())
            .invoker(StubInvoker::new(|call: usize| match call {
                1 => Ok(Box::new("X") as CommandOutput),
                _ => Err(FlowableError::illegal_state("x")),
            }))
            .build()
            .unwrap();
        let executor = CommandExecutor::new(chain.clone(), CommandConfig::default());
        let cmd = command_fn("noop", |_ctx| Ok(()));

        let ok = chain
            .first()
            .proceed(Invocation::new(CommandConfig::default(), &cmd, None, &executor))
            .ok()
            .unwrap();
        assert_eq!(ok.downcast_ref::<&str>(), Some(&"X"));

        let err = chain
            .first()
            .proceed(Invocation::new(
                CommandConfig::default().with_logging(false),
                &cmd,
                None,
                &executor,
            ))
            .err()
            .unwrap();
        assert!(matches!(err, FlowableError::IllegalState(msg) if msg == "x"));
    }
}
