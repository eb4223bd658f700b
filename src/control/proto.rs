//! Communication between the session executor and the outside world: worker threads post
//! tasks into the session queue, callers wait for results through [`Pending`] handles.
use crate::control::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

pub(crate) type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

pub(crate) enum Message<C> {
    Task(Task<C>),
    Stop,
}

/// Sending half of a session task queue.
pub(crate) struct Executor<C> {
    tx: Sender<Message<C>>,
}

impl<C> Clone for Executor<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> Executor<C> {
    /// Queue a task. Return `false` if the session is already gone.
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.tx.send(Message::Task(Box::new(f))).is_ok()
    }

    /// Request the executor loop to stop after already queued tasks.
    pub fn stop(&self) {
        _ = self.tx.send(Message::Stop);
    }
}

/// Receiving half of a session task queue.
pub(crate) struct TaskQueue<C> {
    rx: Receiver<Message<C>>,
}

impl<C> TaskQueue<C> {
    /// Execute tasks one by one, in arrival order, until a stop request.
    pub fn run(self, ctx: &mut C) {
        while let Ok(msg) = self.rx.recv() {
            match msg {
                Message::Task(task) => task(ctx),
                Message::Stop => return,
            }
        }
    }
}

pub(crate) fn task_queue<C>() -> (Executor<C>, TaskQueue<C>) {
    let (tx, rx) = mpsc::channel();
    (Executor { tx }, TaskQueue { rx })
}

#[derive(Clone, Default, Debug)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a request that is not resolved yet.
///
/// Dropping a `Pending` does not cancel the request, use [`Pending::cancel`] for it.
pub struct Pending<T> {
    rx: Receiver<Result<T, Error>>,
    cancel: CancelFlag,
}

impl<T> Pending<T> {
    /// Block until the request is resolved.
    pub fn wait(self) -> Result<T, Error> {
        self.rx.recv().unwrap_or(Err(Error::SessionClosed))
    }

    /// Block until the request is resolved or timeout expires. On timeout the request
    /// is returned back.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T, Error>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(Error::SessionClosed)),
        }
    }

    /// Return the result if it is already available.
    pub fn try_get(&self) -> Option<Result<T, Error>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::SessionClosed)),
        }
    }

    /// Mark request as canceled. A request canceled before its action starts is skipped,
    /// for already started one only the result is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel()
    }
}

/// Resolving half of a [`Pending`].
pub(crate) struct Promise<T> {
    tx: Sender<Result<T, Error>>,
    cancel: CancelFlag,
}

impl<T> Promise<T> {
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    pub fn resolve(self, result: Result<T, Error>) {
        let result = if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            result
        };
        _ = self.tx.send(result);
    }
}

pub(crate) fn promise<T>() -> (Promise<T>, Pending<T>) {
    let (tx, rx) = mpsc::channel();
    let cancel = CancelFlag::default();
    (
        Promise {
            tx,
            cancel: cancel.clone(),
        },
        Pending { rx, cancel },
    )
}
