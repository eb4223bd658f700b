//! Supervision of the external debugger process.
pub(crate) mod launch;

use crate::control::error::Error;
use crate::control::proto::CancelFlag;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strum_macros::{Display, IntoStaticStr};

/// Lifecycle of the backend process. Transitions are monotonic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendState {
    NotInitialized,
    Started,
    Terminated,
}

/// Backend process state, owned by the session executor.
pub(crate) struct Backend {
    state: BackendState,
    pid: Option<i32>,
    exit_code: Option<i32>,
    /// Set by the exit monitor.
    exited: Arc<AtomicBool>,
    /// Set by the launch worker when it gave up because of the launch timeout.
    launch_interrupted: Arc<AtomicBool>,
    /// Started process not yet handed to the exit monitor.
    child: Option<Child>,
    /// Stops the output reader.
    reader_stop: CancelFlag,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            state: BackendState::NotInitialized,
            pid: None,
            exit_code: None,
            exited: Arc::new(AtomicBool::new(false)),
            launch_interrupted: Arc::new(AtomicBool::new(false)),
            child: None,
            reader_stop: CancelFlag::default(),
        }
    }
}

impl Backend {
    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn exited_flag(&self) -> Arc<AtomicBool> {
        self.exited.clone()
    }

    pub fn launch_interrupted(&self) -> bool {
        self.launch_interrupted.load(Ordering::SeqCst)
    }

    pub fn launch_interrupted_flag(&self) -> Arc<AtomicBool> {
        self.launch_interrupted.clone()
    }

    pub fn reader_stop(&self) -> CancelFlag {
        self.reader_stop.clone()
    }

    /// NOT_INITIALIZED -> STARTED. Return `false` if the backend was already started.
    pub fn set_started(&mut self, child: Child) -> bool {
        if self.state != BackendState::NotInitialized {
            return false;
        }
        self.pid = Some(child.id() as i32);
        self.child = Some(child);
        self.state = BackendState::Started;
        true
    }

    /// Hand the started process over to the exit monitor.
    pub fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }

    /// STARTED -> TERMINATED. Return `true` only for the first call.
    pub fn set_terminated(&mut self, exit_code: Option<i32>) -> bool {
        if self.state != BackendState::Started {
            return false;
        }
        self.exit_code = exit_code;
        self.state = BackendState::Terminated;
        self.reader_stop.cancel();
        true
    }

    /// Deliver SIGINT to the backend, the backend interrupts the running inferior.
    pub fn interrupt(&self) -> Result<(), Error> {
        match (self.state, self.pid) {
            (BackendState::Started, Some(pid)) => launch::send_interrupt(pid),
            (BackendState::Terminated, _) => Err(Error::BackendNotRunning),
            _ => {
                log::warn!(target: "backend", "interrupt ignored, backend has no local pid");
                Ok(())
            }
        }
    }
}
