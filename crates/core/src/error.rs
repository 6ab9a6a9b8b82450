//! Engine error model.

use thiserror::Error;

/// Result type used across the engine.
pub type FlowableResult<T> = Result<T, FlowableError>;

/// Engine-level error.
///
/// Every failure that crosses the command executor is one of these variants.
/// The variant (and message) raised by a command is handed back to the caller
/// unchanged, so outer layers can map it to their own representation.
#[derive(Debug, Error)]
pub enum FlowableError {
    /// Engine wiring is wrong (missing transaction manager, unknown session
    /// type, chain without invoker). Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced object does not exist.
    #[error("{message}")]
    ObjectNotFound {
        message: String,
        object_type: Option<String>,
    },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Expected, benign conflict; logged at info rather than error.
    #[error("task {task_id} is already claimed by {assignee}")]
    TaskAlreadyClaimed { task_id: String, assignee: String },

    /// Concurrent modification of shared state. The only retryable kind.
    #[error("optimistic locking failure: {0}")]
    OptimisticLocking(String),

    /// A session failed to flush or close during context teardown.
    #[error("session {session} failed to close: {message}")]
    SessionClose { session: String, message: String },

    /// The transaction manager failed to begin, commit or roll back.
    #[error("transaction failure: {0}")]
    Transaction(String),

    /// Any other error raised by a command. The source stays downcastable.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowableError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            message: msg.into(),
            object_type: None,
        }
    }

    pub fn not_found_of(object_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            message: msg.into(),
            object_type: Some(object_type.into()),
        }
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn already_claimed(task_id: impl Into<String>, assignee: impl Into<String>) -> Self {
        Self::TaskAlreadyClaimed {
            task_id: task_id.into(),
            assignee: assignee.into(),
        }
    }

    pub fn optimistic_locking(msg: impl Into<String>) -> Self {
        Self::OptimisticLocking(msg.into())
    }

    pub fn session_close(session: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SessionClose {
            session: session.into(),
            message: msg.into(),
        }
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Expected conditions that should not be reported as errors.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::TaskAlreadyClaimed { .. })
    }

    pub fn is_optimistic_locking(&self) -> bool {
        matches!(self, Self::OptimisticLocking(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
