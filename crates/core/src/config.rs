//! Per-invocation command configuration.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FlowableError;

/// How a command relates to a transaction that may already be active.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPropagation {
    /// Join the active transaction, or begin one if none is active.
    #[default]
    Required,
    /// Always begin a new transaction (and a new command context).
    RequiresNew,
    /// Run without a transaction.
    NotSupported,
}

impl TransactionPropagation {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionPropagation::Required => "required",
            TransactionPropagation::RequiresNew => "requires_new",
            TransactionPropagation::NotSupported => "not_supported",
        }
    }

    /// Whether a transaction manager must be available for this mode.
    pub fn needs_transaction(self) -> bool {
        !matches!(self, TransactionPropagation::NotSupported)
    }
}

impl fmt::Display for TransactionPropagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionPropagation {
    type Err = FlowableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "requires_new" | "requires-new" => Ok(Self::RequiresNew),
            "not_supported" | "not-supported" => Ok(Self::NotSupported),
            other => Err(FlowableError::configuration(format!(
                "unknown transaction propagation '{other}'"
            ))),
        }
    }
}

/// Configuration consulted by interceptors for a single command invocation.
///
/// Cheap to copy; call sites derive variants from an engine default:
///
/// ```
/// use flowable_core::{CommandConfig, TransactionPropagation};
///
/// let config = CommandConfig::default().transaction_requires_new();
/// assert_eq!(config.propagation(), TransactionPropagation::RequiresNew);
/// assert!(!config.is_context_reuse_possible());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    context_reuse_possible: bool,
    propagation: TransactionPropagation,
    logging_enabled: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            context_reuse_possible: true,
            propagation: TransactionPropagation::Required,
            logging_enabled: true,
        }
    }
}

impl CommandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_context_reuse_possible(&self) -> bool {
        self.context_reuse_possible
    }

    pub fn propagation(&self) -> TransactionPropagation {
        self.propagation
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub fn with_context_reuse_possible(mut self, possible: bool) -> Self {
        self.context_reuse_possible = possible;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn transaction_required(mut self) -> Self {
        self.propagation = TransactionPropagation::Required;
        self
    }

    /// A new transaction cannot share the caller's context, so reuse is
    /// switched off as well.
    pub fn transaction_requires_new(mut self) -> Self {
        self.propagation = TransactionPropagation::RequiresNew;
        self.context_reuse_possible = false;
        self
    }

    pub fn transaction_not_supported(mut self) -> Self {
        self.propagation = TransactionPropagation::NotSupported;
        self
    }
}
