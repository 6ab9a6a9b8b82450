//! Agenda: the FIFO of pending operations owned by one command context.
//!
//! Operations are drained cooperatively by the command invoker on the thread
//! that owns the context. An operation receives the context while it runs
//! and may plan further operations; those always land behind everything that
//! is already queued.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;

use flowable_core::{FlowableError, FlowableResult};

use crate::context::CommandContext;

/// One step planned on an agenda.
///
/// Operations run to completion once started; there is no suspension inside
/// an operation.
pub trait Operation {
    /// Name used by logs and debugger breakpoints.
    fn name(&self) -> &str;

    fn run(self: Box<Self>, ctx: &mut CommandContext) -> FlowableResult<()>;
}

/// An operation backed by a closure.
pub struct FnOperation<F> {
    name: Cow<'static, str>,
    f: F,
}

pub fn operation<F>(name: impl Into<Cow<'static, str>>, f: F) -> FnOperation<F>
where
    F: FnOnce(&mut CommandContext) -> FlowableResult<()>,
{
    FnOperation {
        name: name.into(),
        f,
    }
}

impl<F> Operation for FnOperation<F>
where
    F: FnOnce(&mut CommandContext) -> FlowableResult<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, ctx: &mut CommandContext) -> FlowableResult<()> {
        (self.f)(ctx)
    }
}

/// Ordered queue of pending operations.
#[derive(Default)]
pub struct Agenda {
    operations: VecDeque<Box<dyn Operation>>,
    planned: u64,
}

impl Agenda {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to the tail.
    pub fn plan_operation<O>(&mut self, operation: O)
    where
        O: Operation + 'static,
    {
        self.plan_boxed(Box::new(operation));
    }

    /// Append a closure operation to the tail.
    pub fn plan<F>(&mut self, name: impl Into<Cow<'static, str>>, f: F)
    where
        F: FnOnce(&mut CommandContext) -> FlowableResult<()> + 'static,
    {
        self.plan_operation(operation(name, f));
    }

    pub fn plan_boxed(&mut self, operation: Box<dyn Operation>) {
        tracing::trace!(operation = operation.name(), "operation planned");
        self.planned += 1;
        self.operations.push_back(operation);
    }

    /// Remove and return the head.
    ///
    /// Draining an empty agenda is a programming error.
    pub fn next_operation(&mut self) -> FlowableResult<Box<dyn Operation>> {
        self.operations
            .pop_front()
            .ok_or_else(|| FlowableError::illegal_state("agenda is empty"))
    }

    /// Inspect the head without removing it.
    pub fn peek_operation(&self) -> Option<&dyn Operation> {
        self.operations.front().map(|op| op.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Total number of operations ever planned on this agenda.
    pub fn planned_count(&self) -> u64 {
        self.planned
    }

    /// Drop everything queued behind the first `len` operations. Returns how
    /// many were discarded.
    pub(crate) fn truncate_to(&mut self, len: usize) -> usize {
        let discarded = self.operations.len().saturating_sub(len);
        self.operations.truncate(len);
        discarded
    }

    /// Drop everything still pending. Returns how many were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let discarded = self.operations.len();
        self.operations.clear();
        discarded
    }
}

impl fmt::Debug for Agenda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agenda")
            .field(
                "pending",
                &self.operations.iter().map(|op| op.name()).collect::<Vec<_>>(),
            )
            .field("planned", &self.planned)
            .finish()
    }
}
