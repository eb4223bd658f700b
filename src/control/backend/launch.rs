//! Blocking work around the backend process, each piece on its own thread: launch,
//! launch watchdog, output reader, exit monitor and terminator.
use crate::control::error::Error;
use crate::control::proto::CancelFlag;
use crate::mi::Record;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use timeout_readwrite::TimeoutReader;

/// How often blocked reads wake up to check their stop flag.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Line reader over the backend stdout, reads are interruptible by a stop flag.
pub(crate) struct LineReader {
    inner: BufReader<TimeoutReader<ChildStdout>>,
    buf: Vec<u8>,
}

impl LineReader {
    fn new(stdout: ChildStdout) -> Self {
        Self {
            inner: BufReader::new(TimeoutReader::new(stdout, READ_SLICE)),
            buf: Vec::new(),
        }
    }

    /// Read next line. `Ok(None)` at the end of stream, `Interrupted` error when the
    /// stop flag is raised while waiting.
    pub fn read_line(&mut self, stop: &CancelFlag) -> io::Result<Option<String>> {
        loop {
            if stop.is_canceled() {
                return Err(io::ErrorKind::Interrupted.into());
            }
            match self.inner.read_until(b'\n', &mut self.buf) {
                Ok(0) if self.buf.is_empty() => return Ok(None),
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    return Ok(Some(line));
                }
                // partially read data stays in the buffer
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// A backend that printed its first prompt.
pub(crate) struct Launched {
    pub child: Child,
    pub stdin: ChildStdin,
    pub reader: LineReader,
    /// Records printed before the prompt.
    pub early_records: Vec<Record>,
}

fn spawn_backend(command_line: &[OsString]) -> Result<(Child, ChildStdin, ChildStdout), Error> {
    let Some((program, args)) = command_line.split_first() else {
        return Err(Error::LaunchFailure("empty command line".to_string()));
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::LaunchFailure(format!("{}: {e}", program.to_string_lossy())))?;

    match (child.stdin.take(), child.stdout.take()) {
        (Some(stdin), Some(stdout)) => Ok((child, stdin, stdout)),
        _ => {
            kill_and_reap(&mut child);
            Err(Error::LaunchFailure("backend streams unavailable".to_string()))
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    crate::muted_error!(child.kill(), "kill backend:");
    crate::muted_error!(child.wait(), "wait backend:");
}

/// Spawn the backend and read its output until the first prompt, on a dedicated thread.
///
/// When `interrupt` is raised before the prompt the half-started process is killed and
/// `interrupted` is set. `done` is called exactly once.
pub(crate) fn spawn_launch_worker<F>(
    command_line: Vec<OsString>,
    interrupt: CancelFlag,
    interrupted: Arc<AtomicBool>,
    done: F,
) where
    F: FnOnce(Result<Launched, Error>) + Send + 'static,
{
    thread::spawn(move || {
        let result = launch(&command_line, &interrupt);
        if matches!(result, Err(Error::LaunchInterrupted)) {
            interrupted.store(true, Ordering::SeqCst);
        }
        done(result)
    });
}

fn launch(command_line: &[OsString], interrupt: &CancelFlag) -> Result<Launched, Error> {
    let (mut child, stdin, stdout) = spawn_backend(command_line)?;
    log::debug!(target: "backend", "backend spawned, pid {}", child.id());

    let mut reader = LineReader::new(stdout);
    let mut early_records = vec![];
    loop {
        match reader.read_line(interrupt) {
            Ok(Some(line)) => match Record::parse_lossy(&line) {
                Record::Prompt => break,
                record => early_records.push(record),
            },
            Ok(None) => {
                kill_and_reap(&mut child);
                return Err(Error::LaunchFailure(
                    "backend exited before printing a prompt".to_string(),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                log::debug!(target: "backend", "launch interrupted, kill pid {}", child.id());
                kill_and_reap(&mut child);
                return Err(Error::LaunchInterrupted);
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(Error::LaunchFailure(format!("read backend output: {e}")));
            }
        }
    }

    Ok(Launched {
        child,
        stdin,
        reader,
        early_records,
    })
}

/// Call `on_timeout` if the watchdog is not disarmed in `budget`. Dropping the returned
/// sender disarms the watchdog.
pub(crate) fn spawn_watchdog<F>(budget: Duration, on_timeout: F) -> Sender<()>
where
    F: FnOnce() + Send + 'static,
{
    let (disarm_tx, disarm_rx) = mpsc::channel::<()>();
    thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = disarm_rx.recv_timeout(budget) {
            on_timeout();
        }
    });
    disarm_tx
}

/// Read records until the end of stream or until `on_record` returns `false`.
pub(crate) fn spawn_reader<F>(mut reader: LineReader, stop: CancelFlag, mut on_record: F)
where
    F: FnMut(Record) -> bool + Send + 'static,
{
    thread::spawn(move || loop {
        match reader.read_line(&stop) {
            Ok(Some(line)) => {
                if !on_record(Record::parse_lossy(&line)) {
                    return;
                }
            }
            Ok(None) => {
                log::debug!(target: "backend", "backend output closed");
                return;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return,
            Err(e) => {
                log::warn!(target: "backend", "read backend output: {e}");
                return;
            }
        }
    });
}

/// Wait for the backend exit, set `exited` and report the exit code.
pub(crate) fn spawn_monitor<F>(mut child: Child, exited: Arc<AtomicBool>, on_exit: F)
where
    F: FnOnce(Option<i32>) + Send + 'static,
{
    thread::spawn(move || {
        let code = match child.wait() {
            Ok(status) => status.code(),
            Err(e) => {
                log::warn!(target: "backend", "wait backend: {e}");
                None
            }
        };
        exited.store(true, Ordering::SeqCst);
        on_exit(code)
    });
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TerminatePolicy {
    pub retries: u32,
    pub backoff: Duration,
}

/// Send SIGTERM and poll `exited` with a fixed backoff.
pub(crate) fn spawn_terminator<F>(
    pid: i32,
    exited: Arc<AtomicBool>,
    policy: TerminatePolicy,
    done: F,
) where
    F: FnOnce(Result<(), Error>) + Send + 'static,
{
    thread::spawn(move || done(terminate(pid, &exited, policy)));
}

fn terminate(pid: i32, exited: &AtomicBool, policy: TerminatePolicy) -> Result<(), Error> {
    if exited.load(Ordering::SeqCst) {
        return Ok(());
    }
    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::warn!(target: "backend", "SIGTERM to {pid}: {e}"),
    }

    for _ in 0..policy.retries {
        if exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        thread::sleep(policy.backoff);
    }
    if exited.load(Ordering::SeqCst) {
        return Ok(());
    }
    Err(Error::TerminateFailure {
        pid,
        attempts: policy.retries,
    })
}

pub(crate) fn send_interrupt(pid: i32) -> Result<(), Error> {
    signal::kill(Pid::from_raw(pid), Signal::SIGINT).map_err(|e| Error::from(io::Error::from(e)))
}
