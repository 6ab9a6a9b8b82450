//! `flowable-engine-common`: the command execution core shared by engines.
//!
//! A caller hands a [`Command`] to a [`CommandExecutor`]. The command passes
//! through the [`interceptor`] chain (logging, retries, transactions, context
//! management) and is executed by the command invoker inside a
//! [`CommandContext`]. Work the command plans on the context's [`Agenda`] is
//! drained before the result is returned.
//!
//! ```ignore
//! let engine = Engine::builder(EngineConfig::named("bpmn"))
//!     .transaction_manager(tx_manager)
//!     .session_factory(|| Ok(EntityCache::new()))
//!     .build()?;
//!
//! let deployed = engine
//!     .command_executor()
//!     .execute(command_fn("deploy", |ctx| deploy(ctx, &resources)))?;
//! ```

pub mod agenda;
pub mod command;
pub mod config;
pub mod context;
pub mod engine;
pub mod executor;
pub mod interceptor;
pub mod listener;
pub mod registry;
pub mod services;
pub mod session;

pub use agenda::{Agenda, FnOperation, Operation, operation};
pub use command::{Command, CommandOutput, ErasedCommand, FnCommand, command_fn};
pub use config::EngineConfig;
pub use context::{CommandContext, ContextState};
pub use engine::{Engine, EngineBuilder};
pub use executor::CommandExecutor;
pub use interceptor::{
    BackoffStrategy, CommandContextInterceptor, CommandInterceptor, CommandInvoker,
    DebugCommandInvoker, DebuggerHandle, InterceptorChain, Invocation, LogInterceptor, Next,
    RetryInterceptor, RetryPolicy, Transaction, TransactionInterceptor, TransactionManager,
};
pub use listener::CommandContextCloseListener;
pub use registry::EngineRegistry;
pub use services::ServiceRegistry;
pub use session::{FnSessionFactory, Session, SessionFactories, SessionFactory};
