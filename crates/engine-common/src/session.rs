//! Sessions: per-context resources (database session, entity cache, ...).
//!
//! A session is opened lazily the first time a command asks for its type,
//! memoized for the rest of the context, flushed when the context closes
//! successfully and closed when the context closes, in the order the
//! sessions were opened.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use flowable_core::{FlowableError, FlowableResult};

/// Downcasting support for sessions. Implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A resource scoped to a single command context.
///
/// A session is never shared between contexts. The context calls `flush`
/// at most once (and only when the command succeeded) and `close` exactly
/// once. `rollback` follows a successful `flush` only when the context
/// fails afterwards: a later session's flush or a close listener failed.
pub trait Session: AsAny {
    /// Make staged work durable. Skipped when the context failed.
    ///
    /// A failing flush must leave nothing of itself behind.
    fn flush(&mut self) -> FlowableResult<()> {
        Ok(())
    }

    /// Undo what the last successful `flush` wrote.
    fn rollback(&mut self) -> FlowableResult<()> {
        Ok(())
    }

    /// Release the resource.
    fn close(&mut self) -> FlowableResult<()> {
        Ok(())
    }
}

/// Opens sessions of one type.
pub trait SessionFactory: Send + Sync {
    fn session_type(&self) -> TypeId;

    fn session_type_name(&self) -> &'static str;

    fn open_session(&self) -> FlowableResult<Box<dyn Session>>;
}

/// A session factory backed by a closure.
pub struct FnSessionFactory<S, F> {
    open: F,
    _session: PhantomData<fn() -> S>,
}

impl<S, F> FnSessionFactory<S, F>
where
    S: Session,
    F: Fn() -> FlowableResult<S> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        Self {
            open,
            _session: PhantomData,
        }
    }
}

impl<S, F> SessionFactory for FnSessionFactory<S, F>
where
    S: Session,
    F: Fn() -> FlowableResult<S> + Send + Sync,
{
    fn session_type(&self) -> TypeId {
        TypeId::of::<S>()
    }

    fn session_type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }

    fn open_session(&self) -> FlowableResult<Box<dyn Session>> {
        Ok(Box::new((self.open)()?))
    }
}

/// Session factories keyed by the session type they open.
///
/// Built once at engine configuration time and shared (cheaply cloned) by
/// every context the engine opens.
#[derive(Clone, Default)]
pub struct SessionFactories {
    factories: HashMap<TypeId, Arc<dyn SessionFactory>>,
}

impl SessionFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous factory for the same type.
    pub fn register(&mut self, factory: impl SessionFactory + 'static) {
        self.factories
            .insert(factory.session_type(), Arc::new(factory));
    }

    /// Register a closure that opens sessions of type `S`.
    pub fn register_fn<S, F>(&mut self, open: F)
    where
        S: Session,
        F: Fn() -> FlowableResult<S> + Send + Sync + 'static,
    {
        self.register(FnSessionFactory::new(open));
    }

    pub fn with<S, F>(mut self, open: F) -> Self
    where
        S: Session,
        F: Fn() -> FlowableResult<S> + Send + Sync + 'static,
    {
        self.register_fn(open);
        self
    }

    pub fn contains<S: Session>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<S>())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn get(&self, type_id: TypeId) -> Option<&Arc<dyn SessionFactory>> {
        self.factories.get(&type_id)
    }
}

impl fmt::Debug for SessionFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self
            .factories
            .values()
            .map(|factory| factory.session_type_name())
            .collect();
        names.sort_unstable();
        f.debug_struct("SessionFactories")
            .field("types", &names)
            .finish()
    }
}

struct OpenSession {
    type_name: &'static str,
    session: Box<dyn Session>,
}

/// Sessions opened by one context, in opening order.
#[derive(Default)]
pub(crate) struct OpenSessions {
    sessions: Vec<OpenSession>,
    index: HashMap<TypeId, usize>,
    flushed: usize,
}

impl OpenSessions {
    pub(crate) fn get_or_open<S: Session>(
        &mut self,
        factories: &SessionFactories,
    ) -> FlowableResult<&mut S> {
        let type_id = TypeId::of::<S>();
        let slot = match self.index.get(&type_id) {
            Some(&slot) => slot,
            None => {
                let factory = factories.get(type_id).ok_or_else(|| {
                    FlowableError::configuration(format!(
                        "no session factory registered for {}",
                        std::any::type_name::<S>()
                    ))
                })?;
                let session = factory.open_session()?;
                if !session.as_ref().as_any().is::<S>() {
                    return Err(FlowableError::configuration(format!(
                        "session factory for {} opened a session of another type",
                        std::any::type_name::<S>()
                    )));
                }
                tracing::trace!(session = factory.session_type_name(), "session opened");
                self.sessions.push(OpenSession {
                    type_name: factory.session_type_name(),
                    session,
                });
                let slot = self.sessions.len() - 1;
                self.index.insert(type_id, slot);
                slot
            }
        };

        downcast_mut::<S>(self.sessions[slot].session.as_mut()).ok_or_else(|| {
            FlowableError::illegal_state(format!(
                "session slot for {} holds another type",
                std::any::type_name::<S>()
            ))
        })
    }

    pub(crate) fn get<S: Session>(&mut self) -> Option<&mut S> {
        let slot = *self.index.get(&TypeId::of::<S>())?;
        downcast_mut::<S>(self.sessions[slot].session.as_mut())
    }

    pub(crate) fn contains<S: Session>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<S>())
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Flush every session in opening order, stopping at the first failure.
    pub(crate) fn flush_all(&mut self) -> FlowableResult<()> {
        self.flushed = 0;
        for open in &mut self.sessions {
            open.session.flush()?;
            self.flushed += 1;
        }
        Ok(())
    }

    /// Roll back the sessions the last `flush_all` got through, newest
    /// first. Every one of them is attempted; failures are returned in order.
    pub(crate) fn rollback_flushed(&mut self) -> Vec<FlowableError> {
        let flushed = std::mem::take(&mut self.flushed);
        let mut failures = Vec::new();
        for open in self.sessions[..flushed].iter_mut().rev() {
            if let Err(e) = open.session.rollback() {
                failures.push(FlowableError::session_close(open.type_name, e.to_string()));
            }
        }
        failures
    }

    /// Close and drop every session in opening order.
    ///
    /// Every session gets its `close` call even when an earlier one fails;
    /// the failures are returned in order.
    pub(crate) fn close_all(&mut self) -> Vec<FlowableError> {
        let mut failures = Vec::new();
        for mut open in self.sessions.drain(..) {
            if let Err(e) = open.session.close() {
                failures.push(match e {
                    e @ FlowableError::SessionClose { .. } => e,
                    other => FlowableError::session_close(open.type_name, other.to_string()),
                });
            }
        }
        self.index.clear();
        self.flushed = 0;
        failures
    }
}

fn downcast_mut<S: Session>(session: &mut dyn Session) -> Option<&mut S> {
    session.as_any_mut().downcast_mut::<S>()
}
