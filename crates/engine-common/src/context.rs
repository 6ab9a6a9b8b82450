//! Command context: the unit of work behind one command execution.
//!
//! A context owns everything scoped to a single logical transaction: the
//! lazily opened sessions, the agenda, the nested-result stack, the close
//! listeners and the recorded exception. Nothing in it is shared with other
//! contexts, and it is only ever touched by the thread executing the command.
//!
//! ## Lifecycle
//!
//! ```text
//! Open → ExecutingCommand → DrainingAgenda → Closing → Closed
//!   \__________________\___________________↗
//!            (exception recorded)
//! ```
//!
//! `close` is idempotent. It runs the `closing` listeners, flushes sessions
//! and runs `after_sessions_flush` / `closed` listeners when no exception is
//! recorded. Once an exception is recorded it rolls back whatever sessions
//! already flushed, logs the exception and runs `close_failure` listeners.
//! Sessions are closed last, always, in opening order.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, info, warn};

use flowable_core::{ContextId, FlowableError, FlowableResult};

use crate::agenda::Agenda;
use crate::command::CommandOutput;
use crate::executor::CommandExecutor;
use crate::listener::CommandContextCloseListener;
use crate::session::{OpenSessions, Session, SessionFactories};

/// Where a context is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContextState {
    Open,
    ExecutingCommand,
    DrainingAgenda,
    Closing,
    Closed,
}

pub struct CommandContext {
    id: ContextId,
    command_name: String,
    state: ContextState,
    reused: bool,
    transaction_active: bool,
    session_factories: SessionFactories,
    sessions: OpenSessions,
    results: Vec<CommandOutput>,
    agenda: Agenda,
    close_listeners: Vec<Box<dyn CommandContextCloseListener>>,
    exception: Option<FlowableError>,
    attributes: HashMap<String, Box<dyn Any>>,
    command_executor: Option<CommandExecutor>,
}

impl CommandContext {
    pub fn new(command_name: impl Into<String>, session_factories: SessionFactories) -> Self {
        Self {
            id: ContextId::new(),
            command_name: command_name.into(),
            state: ContextState::Open,
            reused: false,
            transaction_active: false,
            session_factories,
            sessions: OpenSessions::default(),
            results: Vec::new(),
            agenda: Agenda::new(),
            close_listeners: Vec::new(),
            exception: None,
            attributes: HashMap::new(),
            command_executor: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Name of the command that opened this context.
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ContextState::Closed
    }

    pub(crate) fn set_state(&mut self, state: ContextState) {
        self.state = state;
    }

    /// True while a nested command is running inside this context.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn replace_reused(&mut self, reused: bool) -> bool {
        std::mem::replace(&mut self.reused, reused)
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    pub(crate) fn set_transaction_active(&mut self, active: bool) {
        self.transaction_active = active;
    }

    pub(crate) fn set_command_executor(&mut self, executor: CommandExecutor) {
        self.command_executor = Some(executor);
    }

    /// The executor that opened this context, for nested command calls.
    pub fn command_executor(&self) -> FlowableResult<CommandExecutor> {
        self.command_executor.clone().ok_or_else(|| {
            FlowableError::illegal_state(format!(
                "command context {} was not opened by a command executor",
                self.id
            ))
        })
    }

    // --- sessions ---

    /// The session of type `S`, opened through its factory on first use.
    pub fn session<S: Session>(&mut self) -> FlowableResult<&mut S> {
        self.ensure_not_closed("open a session")?;
        self.sessions.get_or_open::<S>(&self.session_factories)
    }

    /// The session of type `S` if it is already open.
    pub fn existing_session<S: Session>(&mut self) -> Option<&mut S> {
        self.sessions.get::<S>()
    }

    pub fn has_session<S: Session>(&self) -> bool {
        self.sessions.contains::<S>()
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions.len()
    }

    // --- agenda ---

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn agenda_mut(&mut self) -> &mut Agenda {
        &mut self.agenda
    }

    // --- close listeners ---

    pub fn add_close_listener(&mut self, listener: impl CommandContextCloseListener + 'static) {
        self.close_listeners.push(Box::new(listener));
    }

    // --- result stack ---

    /// Push a result frame.
    pub fn set_result<T: Any>(&mut self, value: T) -> FlowableResult<()> {
        self.push_result(Box::new(value))
    }

    /// Pop the most recent result frame.
    ///
    /// A frame of another type is left in place and reported as an error.
    pub fn take_result<T: Any>(&mut self) -> FlowableResult<T> {
        let frame = self.pop_result()?;
        match frame.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(frame) => {
                self.results.push(frame);
                Err(FlowableError::illegal_state(format!(
                    "top result frame is not a {}",
                    std::any::type_name::<T>()
                )))
            }
        }
    }

    /// Look at the most recent result frame without removing it.
    pub fn peek_result<T: Any>(&self) -> Option<&T> {
        self.results.last()?.downcast_ref::<T>()
    }

    pub fn result_depth(&self) -> usize {
        self.results.len()
    }

    pub(crate) fn push_result(&mut self, frame: CommandOutput) -> FlowableResult<()> {
        self.ensure_not_closed("push a result")?;
        self.results.push(frame);
        Ok(())
    }

    /// Drop frames above `depth`, left behind by a command that failed.
    pub(crate) fn truncate_results(&mut self, depth: usize) {
        self.results.truncate(depth);
    }

    pub(crate) fn pop_result(&mut self) -> FlowableResult<CommandOutput> {
        self.ensure_not_closed("read a result")?;
        self.results
            .pop()
            .ok_or_else(|| FlowableError::illegal_state("result stack is empty"))
    }

    // --- attributes ---

    pub fn set_attribute<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.attributes.insert(key.into(), Box::new(value));
    }

    pub fn attribute<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key)?.downcast_ref::<T>()
    }

    pub fn remove_attribute(&mut self, key: &str) -> bool {
        self.attributes.remove(key).is_some()
    }

    // --- exception state ---

    pub fn exception(&self) -> Option<&FlowableError> {
        self.exception.as_ref()
    }

    pub fn has_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Record a failure. The first recorded exception is the primary one;
    /// later ones are logged and dropped.
    pub fn record_exception(&mut self, exception: FlowableError) {
        match &self.exception {
            None => self.exception = Some(exception),
            Some(primary) => warn!(
                context_id = %self.id,
                primary = %primary,
                masked = %exception,
                "masked exception in command context"
            ),
        }
    }

    /// Clear and return the recorded exception.
    pub fn take_exception(&mut self) -> Option<FlowableError> {
        self.exception.take()
    }

    // --- teardown ---

    /// Close the context, returning the primary exception if one was recorded.
    pub fn close(&mut self) -> FlowableResult<()> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        self.state = ContextState::Closing;

        // Listeners registered while `closing` runs get their turn too.
        let mut listeners = Vec::new();
        loop {
            let added = std::mem::take(&mut self.close_listeners);
            if added.is_empty() {
                break;
            }
            for listener in &added {
                if let Err(e) = listener.closing(self) {
                    self.record_exception(e);
                }
            }
            listeners.extend(added);
        }

        if self.exception.is_none() {
            match self.sessions.flush_all() {
                Ok(()) => {
                    for listener in &listeners {
                        if let Err(e) = listener.after_sessions_flush(self) {
                            self.record_exception(e);
                            break;
                        }
                    }
                }
                Err(e) => self.record_exception(e),
            }
        }

        if self.exception.is_none() {
            for listener in &listeners {
                if let Err(e) = listener.closed(self) {
                    self.record_exception(e);
                    break;
                }
            }
        }

        if self.exception.is_some() {
            for failure in self.sessions.rollback_flushed() {
                warn!(context_id = %self.id, error = %failure, "session rollback failed");
            }
            self.log_exception();
            for listener in &listeners {
                listener.close_failure(self);
            }
        }

        for failure in self.sessions.close_all() {
            if self.exception.is_none() {
                error!(context_id = %self.id, error = %failure, "session close failed");
                self.exception = Some(failure);
            } else {
                warn!(
                    context_id = %self.id,
                    error = %failure,
                    "session close failed after the command already failed"
                );
            }
        }

        let discarded = self.agenda.clear();
        if discarded > 0 {
            debug!(context_id = %self.id, discarded, "pending operations discarded on close");
        }
        self.results.clear();
        self.attributes.clear();
        self.command_executor = None;
        self.state = ContextState::Closed;

        match self.exception.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn log_exception(&self) {
        let Some(exception) = &self.exception else {
            return;
        };
        if exception.is_benign() {
            info!(
                context_id = %self.id,
                command = %self.command_name,
                error = %exception,
                "command context closed after an expected failure"
            );
        } else {
            error!(
                context_id = %self.id,
                command = %self.command_name,
                error = %exception,
                "error while closing command context"
            );
        }
    }

    fn ensure_not_closed(&self, action: &str) -> FlowableResult<()> {
        if self.is_closed() {
            return Err(FlowableError::illegal_state(format!(
                "cannot {action}: command context {} is closed",
                self.id
            )));
        }
        Ok(())
    }
}

impl Drop for CommandContext {
    fn drop(&mut self) {
        // Only reached without `close` when a command panicked.
        if self.state != ContextState::Closed {
            for failure in self.sessions.close_all() {
                warn!(context_id = %self.id, error = %failure, "session close failed during drop");
            }
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("id", &self.id)
            .field("command", &self.command_name)
            .field("state", &self.state)
            .field("reused", &self.reused)
            .field("sessions", &self.sessions.len())
            .field("results", &self.results.len())
            .field("agenda", &self.agenda)
            .field("exception", &self.exception)
            .finish()
    }
}
