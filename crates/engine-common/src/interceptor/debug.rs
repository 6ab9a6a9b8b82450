//! Command invoker that can pause the agenda at breakpoints.
//!
//! The [`DebugCommandInvoker`] replaces the regular invoker at the end of the
//! chain. Before each agenda operation it asks its breakpoint predicate; on a
//! hit, the executing thread blocks until the paired [`DebuggerHandle`]
//! resumes it. Dropping or detaching the handle releases any suspended
//! thread and disables further breakpoints.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::info;

use flowable_core::FlowableResult;

use super::invoker::execute_and_drain;
use super::{CommandInterceptor, Invocation, Next};
use crate::agenda::Operation;
use crate::command::CommandOutput;
use crate::context::CommandContext;

type Breakpoint = dyn Fn(&dyn Operation) -> bool + Send + Sync;

#[derive(Debug, Default)]
struct DebugState {
    attached: bool,
    suspended_at: Option<String>,
    resume_requested: bool,
    hits: u64,
}

struct Debugger {
    state: Mutex<DebugState>,
    changed: Condvar,
}

impl Debugger {
    fn lock(&self) -> MutexGuard<'_, DebugState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pause_if_hit(
        &self,
        breakpoint: &Breakpoint,
        operation: &dyn Operation,
        ctx: &CommandContext,
    ) {
        if !self.lock().attached || !breakpoint(operation) {
            return;
        }

        let mut state = self.lock();
        state.hits += 1;
        state.suspended_at = Some(operation.name().to_owned());
        info!(context_id = %ctx.id(), operation = operation.name(), "suspended at breakpoint");
        self.changed.notify_all();

        let mut state = self
            .changed
            .wait_while(state, |s| s.attached && !s.resume_requested)
            .unwrap_or_else(PoisonError::into_inner);
        state.resume_requested = false;
        state.suspended_at = None;
        self.changed.notify_all();
    }
}

/// Terminal interceptor that pauses before operations matching a breakpoint.
pub struct DebugCommandInvoker {
    breakpoint: Box<Breakpoint>,
    debugger: Arc<Debugger>,
}

impl DebugCommandInvoker {
    /// Create the invoker and the handle that controls it.
    pub fn new<B>(breakpoint: B) -> (Self, DebuggerHandle)
    where
        B: Fn(&dyn Operation) -> bool + Send + Sync + 'static,
    {
        let debugger = Arc::new(Debugger {
            state: Mutex::new(DebugState {
                attached: true,
                ..Default::default()
            }),
            changed: Condvar::new(),
        });
        let invoker = Self {
            breakpoint: Box::new(breakpoint),
            debugger: debugger.clone(),
        };
        (invoker, DebuggerHandle { debugger })
    }

    /// Break before every operation with the given name.
    pub fn at_operation(name: impl Into<String>) -> (Self, DebuggerHandle) {
        let name = name.into();
        Self::new(move |op: &dyn Operation| op.name() == name)
    }
}

impl CommandInterceptor for DebugCommandInvoker {
    fn execute(
        &self,
        invocation: Invocation<'_>,
        _next: Next<'_>,
    ) -> FlowableResult<CommandOutput> {
        execute_and_drain(invocation, |operation, ctx| {
            self.debugger.pause_if_hit(self.breakpoint.as_ref(), operation, ctx)
        })
    }
}

impl fmt::Debug for DebugCommandInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugCommandInvoker")
            .field("state", &*self.debugger.lock())
            .finish()
    }
}

/// Controls a [`DebugCommandInvoker`] from another thread.
pub struct DebuggerHandle {
    debugger: Arc<Debugger>,
}

impl DebuggerHandle {
    /// Name of the operation the executing thread is paused at.
    pub fn suspended_at(&self) -> Option<String> {
        self.debugger.lock().suspended_at.clone()
    }

    /// Block until a thread is paused at a breakpoint, or `timeout` passes.
    pub fn wait_until_suspended(&self, timeout: Duration) -> Option<String> {
        let state = self.debugger.lock();
        let (state, _) = self
            .debugger
            .changed
            .wait_timeout_while(state, timeout, |s| {
                s.attached && (s.suspended_at.is_none() || s.resume_requested)
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.suspended_at.clone().filter(|_| !state.resume_requested)
    }

    /// Let the paused thread continue. Returns false when nothing was paused.
    pub fn resume(&self) -> bool {
        let mut state = self.debugger.lock();
        if state.suspended_at.is_none() || state.resume_requested {
            return false;
        }
        state.resume_requested = true;
        self.debugger.changed.notify_all();
        true
    }

    /// Number of times a breakpoint has been hit.
    pub fn breakpoint_hits(&self) -> u64 {
        self.debugger.lock().hits
    }

    /// Stop breaking and release any paused thread.
    pub fn detach(&self) {
        let mut state = self.debugger.lock();
        if state.attached {
            state.attached = false;
            self.debugger.changed.notify_all();
        }
    }
}

impl Drop for DebuggerHandle {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for DebuggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerHandle")
            .field("state", &*self.debugger.lock())
            .finish()
    }
}
