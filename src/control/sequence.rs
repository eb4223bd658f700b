//! Ordered multi-step initialization and shutdown.
//!
//! Steps initialize strictly in order and the first failure aborts the sequence. Shutdown
//! walks the initialized steps in reverse order, never stops on a failure and reports all
//! failures together. Steps report their completion themselves, there is no timeout.
use crate::control::error::Error;
use std::cell::Cell;
use std::rc::Rc;

/// Completion callback of a step.
pub(crate) type Done<C> = Box<dyn FnOnce(&mut C, Result<(), Error>)>;

pub(crate) struct Step<C> {
    pub name: &'static str,
    pub initialize: fn(&mut C, Done<C>),
    pub shutdown: fn(&mut C, Done<C>),
}

impl<C> Clone for Step<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Step<C> {}

pub(crate) struct Sequence<C> {
    steps: Vec<Step<C>>,
    /// Length of the initialized prefix.
    initialized: Cell<usize>,
    aborted: Cell<bool>,
    running: Cell<bool>,
}

impl<C: 'static> Sequence<C> {
    pub fn new(steps: Vec<Step<C>>) -> Rc<Self> {
        Rc::new(Self {
            steps,
            initialized: Cell::new(0),
            aborted: Cell::new(false),
            running: Cell::new(false),
        })
    }

    /// Names of initialized steps, in initialization order.
    pub fn initialized_steps(&self) -> Vec<&'static str> {
        self.steps[..self.initialized.get()]
            .iter()
            .map(|s| s.name)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Stop initialization before the next step. The step in progress is not canceled.
    pub fn abort(&self) {
        self.aborted.set(true)
    }

    pub fn initialize(self: &Rc<Self>, owner: &mut C, done: Done<C>) {
        self.running.set(true);
        self.aborted.set(false);
        Self::initialize_from(self.clone(), owner, self.initialized.get(), done)
    }

    fn initialize_from(seq: Rc<Self>, owner: &mut C, idx: usize, done: Done<C>) {
        if seq.aborted.get() {
            seq.running.set(false);
            log::debug!(target: "sequence", "initialization aborted before step {idx}");
            return done(owner, Err(Error::Canceled));
        }
        let Some(step) = seq.steps.get(idx).copied() else {
            seq.running.set(false);
            return done(owner, Ok(()));
        };

        log::debug!(target: "sequence", "initialize `{}`", step.name);
        (step.initialize)(
            owner,
            Box::new(move |owner: &mut C, result| match result {
                Ok(()) => {
                    seq.initialized.set(idx + 1);
                    Self::initialize_from(seq, owner, idx + 1, done)
                }
                Err(e) => {
                    seq.running.set(false);
                    log::warn!(target: "sequence", "step `{}` failed: {e}", step.name);
                    done(owner, Err(e))
                }
            }),
        )
    }

    /// Release initialized steps in reverse order.
    pub fn shutdown(self: &Rc<Self>, owner: &mut C, done: Done<C>) {
        self.running.set(true);
        let count = self.initialized.get();
        Self::shutdown_from(self.clone(), owner, count, vec![], done)
    }

    fn shutdown_from(seq: Rc<Self>, owner: &mut C, count: usize, mut errors: Vec<Error>, done: Done<C>) {
        if count == 0 {
            seq.running.set(false);
            let result = match errors.len() {
                0 => Ok(()),
                1 => Err(errors.remove(0)),
                _ => Err(Error::MultipleErrors(errors)),
            };
            return done(owner, result);
        }

        let step = seq.steps[count - 1];
        log::debug!(target: "sequence", "shutdown `{}`", step.name);
        (step.shutdown)(
            owner,
            Box::new(move |owner: &mut C, result| {
                if let Err(e) = result {
                    log::warn!(target: "sequence", "shutdown of `{}` failed: {e}", step.name);
                    errors.push(e);
                }
                seq.initialized.set(count - 1);
                Self::shutdown_from(seq, owner, count - 1, errors, done)
            }),
        )
    }
}
