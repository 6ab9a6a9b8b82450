//! Engine configuration.
//!
//! Loaded from JSON or from environment variables:
//!
//! | variable                           | field                             |
//! |------------------------------------|-----------------------------------|
//! | `FLOWABLE_ENGINE_NAME`             | `name`                            |
//! | `FLOWABLE_CONTEXT_REUSE`           | `command.context_reuse_possible`  |
//! | `FLOWABLE_TRANSACTION_PROPAGATION` | `command.propagation`             |
//! | `FLOWABLE_COMMAND_LOGGING`         | `command.logging_enabled`         |
//! | `FLOWABLE_COMMAND_RETRIES`         | `retry.max_attempts` (0 = off)    |
//!
//! Unset variables keep their defaults.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use flowable_core::{CommandConfig, FlowableError, FlowableResult, TransactionPropagation};

use crate::interceptor::RetryPolicy;

pub const ENV_ENGINE_NAME: &str = "FLOWABLE_ENGINE_NAME";
pub const ENV_CONTEXT_REUSE: &str = "FLOWABLE_CONTEXT_REUSE";
pub const ENV_TRANSACTION_PROPAGATION: &str = "FLOWABLE_TRANSACTION_PROPAGATION";
pub const ENV_COMMAND_LOGGING: &str = "FLOWABLE_COMMAND_LOGGING";
pub const ENV_COMMAND_RETRIES: &str = "FLOWABLE_COMMAND_RETRIES";

pub const DEFAULT_ENGINE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Config used by `CommandExecutor::execute` when none is given.
    pub command: CommandConfig,
    /// Retry policy for optimistic-locking failures; `None` leaves the retry
    /// interceptor out of the chain.
    pub retry: Option<RetryPolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ENGINE_NAME.to_owned(),
            command: CommandConfig::default(),
            retry: None,
        }
    }
}

impl EngineConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> FlowableResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FlowableError::configuration(format!("invalid engine configuration: {e}")))
    }

    pub fn from_env() -> FlowableResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `lookup`, which maps variable names to values.
    pub fn from_lookup<F>(lookup: F) -> FlowableResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_ENGINE_NAME) {
            if name.trim().is_empty() {
                return Err(FlowableError::configuration(format!(
                    "{ENV_ENGINE_NAME} must not be empty"
                )));
            }
            config.name = name;
        }

        let mut command = config.command;
        if let Some(propagation) = lookup(ENV_TRANSACTION_PROPAGATION) {
            command = match TransactionPropagation::from_str(propagation.trim())? {
                TransactionPropagation::Required => command.transaction_required(),
                TransactionPropagation::RequiresNew => command.transaction_requires_new(),
                TransactionPropagation::NotSupported => command.transaction_not_supported(),
            };
        }
        if let Some(reuse) = lookup(ENV_CONTEXT_REUSE) {
            command = command.with_context_reuse_possible(parse(ENV_CONTEXT_REUSE, &reuse)?);
        }
        if let Some(logging) = lookup(ENV_COMMAND_LOGGING) {
            command = command.with_logging(parse(ENV_COMMAND_LOGGING, &logging)?);
        }
        config.command = command;

        if let Some(retries) = lookup(ENV_COMMAND_RETRIES) {
            let max_attempts: u32 = parse(ENV_COMMAND_RETRIES, &retries)?;
            config.retry = (max_attempts > 0).then(|| RetryPolicy {
                max_attempts,
                ..Default::default()
            });
        }

        Ok(config)
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

fn parse<T>(key: &str, raw: &str) -> FlowableResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| FlowableError::configuration(format!("invalid value {raw:?} for {key}: {e}")))
}
