//! Publish/subscribe bus for session lifecycle events.
//!
//! The bus is the only state shared between sessions.
use crate::control::backend::BackendState;
use crate::control::context::{ContainerContext, Context, ExecutionContext, SessionId};
use crate::control::run_control::StopReason;
use crate::mi::StreamKind;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    BackendStateChanged(BackendState),
    ContainerStarted(ContainerContext),
    ContainerExited(ContainerContext),
    ThreadStarted(ExecutionContext),
    ThreadExited(ExecutionContext),
    Suspended { context: Context, reason: StopReason },
    Resumed { context: Context },
    /// Console, target or log output of the backend.
    Output(StreamKind, String),
}

#[derive(Default)]
struct Subscriptions {
    subscribers: HashMap<SessionId, Vec<Sender<Event>>>,
    registered: HashSet<SessionId>,
}

/// Event bus, cheap to clone.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Subscriptions>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every event published for a session after this call.
    pub fn subscribe(&self, session: SessionId) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.entry(session).or_default().push(tx);
        rx
    }

    pub fn publish(&self, session: SessionId, event: Event) {
        log::trace!(target: "session", "{session}: {event:?}");
        let mut subscriptions = self.lock();
        if let Some(subscribers) = subscriptions.subscribers.get_mut(&session) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Mark session as live, services of the session are reachable through the bus.
    pub fn register(&self, session: SessionId) {
        self.lock().registered.insert(session);
    }

    pub fn unregister(&self, session: SessionId) {
        self.lock().registered.remove(&session);
    }

    /// Drop subscribers of a finished session, their receivers disconnect.
    pub(crate) fn close(&self, session: SessionId) {
        self.lock().subscribers.remove(&session);
    }

    pub fn is_registered(&self, session: SessionId) -> bool {
        self.lock().registered.contains(&session)
    }
}
