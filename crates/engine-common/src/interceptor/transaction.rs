use std::sync::Arc;

use tracing::{debug, error};

use flowable_core::{FlowableError, FlowableResult, TransactionPropagation};

use super::{CommandInterceptor, Invocation, Next};
use crate::command::CommandOutput;

/// A running transaction handed out by a [`TransactionManager`].
pub trait Transaction {
    fn commit(self: Box<Self>) -> FlowableResult<()>;

    fn rollback(self: Box<Self>) -> FlowableResult<()>;
}

/// Source of transactions for the [`TransactionInterceptor`].
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> FlowableResult<Box<dyn Transaction>>;
}

/// Wraps the rest of the chain in a transaction, according to the
/// invocation's propagation.
///
/// | propagation     | transaction already active | no transaction active |
/// |-----------------|----------------------------|-----------------------|
/// | `Required`      | join it                    | begin a new one       |
/// | `RequiresNew`   | begin a new one            | begin a new one       |
/// | `NotSupported`  | run without                | run without           |
///
/// A transaction begun here is committed when the rest of the chain returns
/// `Ok` and rolled back otherwise. A failed rollback is logged; the command's
/// own error is what the caller sees.
#[derive(Clone, Default)]
pub struct TransactionInterceptor {
    manager: Option<Arc<dyn TransactionManager>>,
}

impl TransactionInterceptor {
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            manager: Some(manager),
        }
    }

    /// An interceptor that can only serve `NotSupported` invocations and
    /// invocations joining an already active transaction.
    pub fn without_manager() -> Self {
        Self { manager: None }
    }

    pub fn has_manager(&self) -> bool {
        self.manager.is_some()
    }

    fn manager(&self, command: &str) -> FlowableResult<&dyn TransactionManager> {
        self.manager.as_deref().ok_or_else(|| {
            FlowableError::configuration(format!(
                "command {command} needs a transaction but no transaction manager is configured"
            ))
        })
    }
}

impl CommandInterceptor for TransactionInterceptor {
    fn execute(
        &self,
        mut invocation: Invocation<'_>,
        next: Next<'_>,
    ) -> FlowableResult<CommandOutput> {
        let propagation = invocation.config().propagation();
        let begin = match propagation {
            TransactionPropagation::Required => !invocation.is_transaction_active(),
            TransactionPropagation::RequiresNew => true,
            TransactionPropagation::NotSupported => {
                invocation.set_transaction_active(false);
                return next.proceed(invocation);
            }
        };
        if !begin {
            return next.proceed(invocation);
        }

        let command = invocation.command_name();
        let tx = self.manager(command)?.begin()?;
        debug!(command, %propagation, "transaction started");
        invocation.set_transaction_active(true);

        match next.proceed(invocation) {
            Ok(output) => {
                tx.commit()?;
                debug!(command, "transaction committed");
                Ok(output)
            }
            Err(e) => {
                match tx.rollback() {
                    Ok(()) => debug!(command, error = %e, "transaction rolled back"),
                    Err(rollback) => error!(
                        command,
                        error = %e,
                        rollback_error = %rollback,
                        "transaction rollback failed"
                    ),
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TransactionInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionInterceptor")
            .field("has_manager", &self.has_manager())
            .finish()
    }
}
