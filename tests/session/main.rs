mod common;

mod launch;
mod notifications;
mod shutdown;

use crate::common::{init_logger, FakeBackend, MI_BACKEND, WAIT};
use mi_control::control::{BackendState, Event, SessionBuilder};
use mi_control::mi::MiCommand;
use serial_test::serial;
use std::sync::mpsc::RecvTimeoutError;

#[test]
#[serial]
fn test_session_start_and_graceful_shutdown() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();

    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::Started
    );
    assert!(session.bus().is_registered(session.id()));
    let pid = session.backend_pid().wait().unwrap().unwrap();

    let record = session.execute(MiCommand::new("-gdb-version")).wait().unwrap();
    assert!(record.results.is_empty());

    session.shutdown().wait().unwrap();
    common::wait_event(&events, |e| {
        *e == Event::BackendStateChanged(BackendState::Terminated)
    });
    assert!(!session.bus().is_registered(session.id()));
    assert_no_proc!(pid);
}

#[test]
#[serial]
fn test_dropping_last_handle_closes_session() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();
    let pid = session.backend_pid().wait().unwrap().unwrap();

    let clone = session.clone();
    drop(session);
    assert_eq!(
        clone.backend_state().wait().unwrap(),
        BackendState::Started
    );
    drop(clone);

    common::wait_event(&events, |e| {
        *e == Event::BackendStateChanged(BackendState::Terminated)
    });
    // subscription is closed after shutdown
    loop {
        match events.recv_timeout(WAIT) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => panic!("subscription is not closed"),
        }
    }
    assert_no_proc!(pid);
}
