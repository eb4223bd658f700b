use crate::common::{init_logger, wait_event, FakeBackend, MI_BACKEND};
use crate::assert_no_proc;
use mi_control::control::{BackendState, Error, Event, SessionBuilder};
use mi_control::mi::{MiCommand, ResultClass};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serial_test::serial;
use std::time::Duration;

const STUBBORN_BACKEND: &str = r#"
trap '' TERM
printf '(gdb)\n'
while read -r line; do
    printf '%s^done\n(gdb)\n' "${line%%-*}"
done
"#;

fn is_terminated(event: &Event) -> bool {
    *event == Event::BackendStateChanged(BackendState::Terminated)
}

#[test]
#[serial]
fn test_terminate_failure() {
    init_logger();
    let backend = FakeBackend::new(STUBBORN_BACKEND);
    let mut config = backend.config();
    config.debugger.terminate_retries = 3;

    let (session, started) = SessionBuilder::new(config).start().unwrap();
    let events = session.events();
    started.wait().unwrap();
    let pid = session.backend_pid().wait().unwrap().unwrap();

    match session.shutdown().wait() {
        Err(Error::TerminateFailure { pid: failed, attempts }) => {
            assert_eq!(failed, pid);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected shutdown result: {other:?}"),
    }
    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::Started
    );

    signal::kill(Pid::from_raw(pid), Signal::SIGKILL).unwrap();
    wait_event(&events, is_terminated);
    assert_no_proc!(pid);
}

#[test]
#[serial]
fn test_concurrent_terminate_is_shared() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();

    let first = session.terminate();
    let second = session.clone().terminate();
    assert!(first.wait().is_ok());
    assert!(second.wait().is_ok());

    wait_event(&events, is_terminated);
    let again = events
        .recv_timeout(Duration::from_millis(300))
        .into_iter()
        .filter(is_terminated)
        .count();
    assert_eq!(again, 0);

    // already terminated backend
    assert!(session.terminate().wait().is_ok());
}

#[test]
#[serial]
fn test_backend_exit_is_observed() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();

    let record = session.execute(MiCommand::gdb_exit()).wait().unwrap();
    assert_eq!(record.class, ResultClass::Exit);
    wait_event(&events, is_terminated);

    assert_eq!(session.exit_code().wait().unwrap(), Some(0));
    let err = session
        .execute(MiCommand::new("-gdb-version"))
        .wait()
        .unwrap_err();
    assert!(matches!(err, Error::BackendNotRunning));
    assert!(session.shutdown().wait().is_ok());
}

#[test]
#[serial]
fn test_shutdown_during_launch() {
    init_logger();
    let backend = FakeBackend::new(&format!("sleep 2\n{MI_BACKEND}"));
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();

    let shutdown = session.shutdown();
    assert!(matches!(started.wait(), Err(Error::LaunchInterrupted)));
    assert!(shutdown.wait().is_ok());
    assert!(session.launch_interrupted().wait().unwrap());
    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::NotInitialized
    );
}
