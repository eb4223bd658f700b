use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Control layer error. Cloneable, one reply may resolve many waiting requests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // --------------------------------- backend launch errors -------------------------------------
    #[error("launch debugger backend: {0}")]
    LaunchFailure(String),
    #[error("debugger backend did not print a prompt in {0:?}")]
    LaunchTimeout(Duration),
    #[error("launch interrupted")]
    LaunchInterrupted,

    // --------------------------------- backend termination errors --------------------------------
    #[error("debugger backend (pid {pid}) is still alive after {attempts} termination attempts")]
    TerminateFailure { pid: i32, attempts: u32 },
    #[error("debugger backend is not running")]
    BackendNotRunning,

    // --------------------------------- protocol errors -------------------------------------------
    #[error("`{command}` failed: {message}")]
    Protocol {
        command: String,
        message: String,
        code: Option<String>,
    },
    #[error("malformed reply `{0}`: {1}")]
    MalformedReply(String, &'static str),

    // --------------------------------- request errors --------------------------------------------
    #[error("invalid context: {0}")]
    InvalidContext(String),
    #[error("{0} is not supported")]
    NotSupported(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("request canceled")]
    Canceled,
    #[error("session closed")]
    SessionClosed,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(Arc<io::Error>),
    #[error("multiple errors {0:?}")]
    MultipleErrors(Vec<Self>),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IO(Arc::new(e))
    }
}

impl Error {
    /// Return a hint to a front-end - continue using the session after error or drop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::LaunchInterrupted => false,
            Error::TerminateFailure { .. } => false,
            Error::Protocol { .. } => false,
            Error::MalformedReply(_, _) => false,
            Error::InvalidContext(_) => false,
            Error::NotSupported(_) => false,
            Error::InvalidState(_) => false,
            Error::Canceled => false,
            Error::InvalidConfig(_) => false,
            Error::IO(_) => false,
            Error::MultipleErrors(_) => false,

            // session is unusable after these
            Error::LaunchFailure(_) => true,
            Error::LaunchTimeout(_) => true,
            Error::BackendNotRunning => true,
            Error::SessionClosed => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "session", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
