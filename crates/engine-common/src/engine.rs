//! Engine assembly.
//!
//! An [`Engine`] is a named command executor plus the services built on top
//! of it. [`EngineBuilder`] wires the interceptor chain in a fixed order:
//!
//! ```text
//! [pre interceptors]
//!   → LogInterceptor
//!   → RetryInterceptor           (only with a retry policy)
//!   → TransactionInterceptor
//!   → CommandContextInterceptor
//!   → [post interceptors]
//!   → CommandInvoker             (or a custom invoker)
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use flowable_core::{FlowableError, FlowableResult};

use crate::config::EngineConfig;
use crate::executor::CommandExecutor;
use crate::interceptor::{
    CommandContextInterceptor, CommandInterceptor, CommandInvoker, InterceptorChain, LogInterceptor,
    RetryInterceptor, TransactionInterceptor, TransactionManager,
};
use crate::registry::EngineRegistry;
use crate::services::ServiceRegistry;
use crate::session::{Session, SessionFactories, SessionFactory};

pub struct Engine {
    config: EngineConfig,
    executor: CommandExecutor,
    services: ServiceRegistry,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn command_executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn service<T: Any + Send + Sync>(&self) -> FlowableResult<Arc<T>> {
        self.services.get::<T>()
    }

    /// Remove this engine from `registry`. A newer engine registered under
    /// the same name stays where it is.
    pub fn close(&self, registry: &EngineRegistry) {
        if !registry.unregister_engine(self) {
            debug!(engine = self.name(), "engine was not registered; registry left untouched");
        }
        info!(engine = self.name(), "engine closed");
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.config.name)
            .field("executor", &self.executor)
            .field("services", &self.services)
            .finish()
    }
}

type ServiceInit = Box<dyn FnOnce(&CommandExecutor, &mut ServiceRegistry) -> FlowableResult<()>>;

pub struct EngineBuilder {
    config: EngineConfig,
    session_factories: SessionFactories,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    pre_interceptors: Vec<Arc<dyn CommandInterceptor>>,
    post_interceptors: Vec<Arc<dyn CommandInterceptor>>,
    invoker: Option<Arc<dyn CommandInterceptor>>,
    services: ServiceRegistry,
    service_inits: Vec<ServiceInit>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session_factories: SessionFactories::new(),
            transaction_manager: None,
            pre_interceptors: Vec::new(),
            post_interceptors: Vec::new(),
            invoker: None,
            services: ServiceRegistry::new(),
            service_inits: Vec::new(),
        }
    }

    pub fn session_factory<S, F>(mut self, open: F) -> Self
    where
        S: Session,
        F: Fn() -> FlowableResult<S> + Send + Sync + 'static,
    {
        self.session_factories.register_fn(open);
        self
    }

    pub fn custom_session_factory(mut self, factory: impl SessionFactory + 'static) -> Self {
        self.session_factories.register(factory);
        self
    }

    pub fn transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(manager);
        self
    }

    /// Runs ahead of the built-in interceptors.
    pub fn pre_interceptor(mut self, interceptor: impl CommandInterceptor + 'static) -> Self {
        self.pre_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Runs inside the command context, just before the invoker.
    pub fn post_interceptor(mut self, interceptor: impl CommandInterceptor + 'static) -> Self {
        self.post_interceptors.push(Arc::new(interceptor));
        self
    }

    /// Replace the default [`CommandInvoker`].
    pub fn command_invoker(mut self, invoker: impl CommandInterceptor + 'static) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    pub fn service<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.services.register(service);
        self
    }

    /// Register a service built from the engine's command executor once the
    /// chain exists.
    pub fn service_with<T, F>(mut self, init: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&CommandExecutor) -> FlowableResult<T> + 'static,
    {
        self.service_inits.push(Box::new(move |executor, services| {
            services.register(init(executor)?);
            Ok(())
        }));
        self
    }

    pub fn build(self) -> FlowableResult<Engine> {
        let propagation = self.config.command.propagation();
        if propagation.needs_transaction() && self.transaction_manager.is_none() {
            return Err(FlowableError::configuration(format!(
                "engine {} uses {propagation} transactions but has no transaction manager",
                self.config.name
            )));
        }

        let mut chain = InterceptorChain::builder()
            .with_all(self.pre_interceptors)
            .with(LogInterceptor::new());
        if let Some(policy) = &self.config.retry {
            chain = chain.with(RetryInterceptor::new(policy.clone()));
        }
        let transactions = match self.transaction_manager {
            Some(manager) => TransactionInterceptor::new(manager),
            None => TransactionInterceptor::without_manager(),
        };
        let chain = chain
            .with(transactions)
            .with(CommandContextInterceptor::new(self.session_factories))
            .with_all(self.post_interceptors)
            .shared_invoker(self.invoker.unwrap_or_else(|| Arc::new(CommandInvoker::new())))
            .build()?;

        info!(engine = %self.config.name, chain = ?chain, "engine built");
        let executor = CommandExecutor::new(chain, self.config.command);

        let mut services = self.services;
        for init in self.service_inits {
            init(&executor, &mut services)?;
        }

        Ok(Engine {
            config: self.config,
            executor,
            services,
        })
    }

    /// Build the engine and register it under its name.
    pub fn build_and_register(self, registry: &EngineRegistry) -> FlowableResult<Arc<Engine>> {
        let engine = Arc::new(self.build()?);
        registry.register(engine.clone());
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use flowable_core::CommandConfig;

    use super::*;
    use crate::command::command_fn;
    use crate::context::CommandContext;
    use crate::interceptor::{Transaction, TransactionManager};

    struct NoopManager;
    struct NoopTx;

    impl TransactionManager for NoopManager {
        fn begin(&self) -> FlowableResult<Box<dyn Transaction>> {
            Ok(Box::new(NoopTx))
        }
    }

    impl Transaction for NoopTx {
        fn commit(self: Box<Self>) -> FlowableResult<()> {
            Ok(())
        }

        fn rollback(self: Box<Self>) -> FlowableResult<()> {
            Ok(())
        }
    }

    struct HistoryService {
        executor: CommandExecutor,
    }

    impl HistoryService {
        fn count(&self) -> FlowableResult<usize> {
            self.executor.execute(command_fn("count", |_ctx: &mut CommandContext| Ok(3_usize)))
        }
    }

    #[test]
    fn required_propagation_needs_a_transaction_manager() {
        let err = EngineBuilder::new(EngineConfig::named("bpmn")).build().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn chain_is_assembled_in_order() {
        let engine = EngineBuilder::new(EngineConfig::named("bpmn").with_retry(Default::default()))
            .transaction_manager(Arc::new(NoopManager))
            .build()
            .unwrap();

        assert_eq!(
            engine.command_executor().chain().names(),
            [
                "LogInterceptor",
                "RetryInterceptor",
                "TransactionInterceptor",
                "CommandContextInterceptor",
                "CommandInvoker",
            ]
        );
    }

    #[test]
    fn services_can_use_the_engine_executor() {
        let config = EngineConfig {
            command: CommandConfig::new().transaction_not_supported(),
            ..EngineConfig::named("cmmn")
        };
        let engine = EngineBuilder::new(config)
            .service_with(|executor| {
                Ok(HistoryService {
                    executor: executor.clone(),
                })
            })
            .build()
            .unwrap();

        assert_eq!(engine.service::<HistoryService>().unwrap().count().unwrap(), 3);
    }

    #[test]
    fn close_unregisters_the_engine() {
        let registry = EngineRegistry::new();
        let engine = EngineBuilder::new(EngineConfig::named("dmn"))
            .transaction_manager(Arc::new(NoopManager))
            .build_and_register(&registry)
            .unwrap();
        assert!(registry.lookup("dmn").is_some());

        engine.close(&registry);
        assert!(registry.lookup("dmn").is_none());
    }

    #[test]
    fn closing_a_replaced_engine_keeps_its_successor_registered() {
        let registry = EngineRegistry::new();
        let build = || {
            EngineBuilder::new(EngineConfig::named("dmn"))
                .transaction_manager(Arc::new(NoopManager))
                .build_and_register(&registry)
                .unwrap()
        };
        let stale = build();
        let current = build();

        stale.close(&registry);
        let registered = registry.lookup("dmn").unwrap();
        assert!(Arc::ptr_eq(&registered, &current));

        current.close(&registry);
        assert!(registry.is_empty());
    }
}
