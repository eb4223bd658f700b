use crate::common::{init_logger, poll, wait_event, FakeBackend, MI_BACKEND};
use mi_control::control::{
    Context, Error, Event, ExecState, SessionBuilder, SessionHandle, StopReason,
};
use mi_control::mi::MiCommand;
use serial_test::serial;
use std::sync::mpsc::Receiver;

fn running_session(backend: &FakeBackend) -> (SessionHandle, Receiver<Event>) {
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();

    session.execute(MiCommand::new("-exec-run")).wait().unwrap();
    wait_event(&events, |e| matches!(e, Event::Resumed { .. }));
    (session, events)
}

#[test]
#[serial]
fn test_inferior_lifecycle_events() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();
    let events = session.events();
    started.wait().unwrap();

    session.execute(MiCommand::new("-exec-run")).wait().unwrap();
    let container = match wait_event(&events, |e| matches!(e, Event::ContainerStarted(_))) {
        Event::ContainerStarted(c) => c,
        _ => unreachable!(),
    };
    assert_eq!(container.id(), "i1");
    assert_eq!(container.process().id(), "42");

    for expected in ["1", "2"] {
        match wait_event(&events, |e| matches!(e, Event::ThreadStarted(_))) {
            Event::ThreadStarted(ctx) => {
                assert_eq!(ctx.id(), expected);
                assert_eq!(ctx.container(), &container);
            }
            _ => unreachable!(),
        }
    }
    wait_event(&events, |e| {
        matches!(e, Event::Resumed { context: Context::Container(c) } if c.id() == "i1")
    });

    let known = session
        .known_execution_contexts(container.clone())
        .wait()
        .unwrap();
    assert_eq!(known.len(), 2);
    assert_eq!(
        session.container_from_thread_id("2").wait().unwrap(),
        container
    );
    assert!(matches!(
        session.container_from_thread_id("99").wait(),
        Err(Error::InvalidContext(_))
    ));
}

#[test]
#[serial]
fn test_process_name_is_resolved() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, _events) = running_session(&backend);

    let processes = session.processes().wait().unwrap();
    assert_eq!(processes.len(), 1);
    let name = poll(|| {
        session
            .process_data(processes[0].clone())
            .wait()
            .unwrap()
            .name
    });
    assert_eq!(name, "app");

    let attachable = session.attachable_processes().wait().unwrap();
    assert_eq!(attachable.len(), 2);
    assert_eq!(attachable[1].pid, "42");
}

#[test]
#[serial]
fn test_suspend_resume_cycle() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (session, events) = running_session(&backend);

    let container = session.containers().wait().unwrap().remove(0);
    let thread: Context = session
        .known_execution_contexts(container.clone())
        .wait()
        .unwrap()
        .remove(0)
        .into();
    assert_eq!(
        session.exec_state(thread.clone()).wait().unwrap(),
        Some(ExecState::Running)
    );
    assert!(session.can_suspend(thread.clone()).wait().unwrap());
    assert!(matches!(
        session.resume(thread.clone()).wait(),
        Err(Error::InvalidState(_))
    ));

    session
        .execute(MiCommand::exec_interrupt())
        .wait()
        .unwrap();
    match wait_event(&events, |e| matches!(e, Event::Suspended { .. })) {
        Event::Suspended { context, reason } => {
            assert_eq!(context, Context::Container(container.clone()));
            assert_eq!(reason, StopReason::SignalReceived);
        }
        _ => unreachable!(),
    }
    assert!(session.can_resume(thread.clone()).wait().unwrap());

    let listed = session.execution_contexts(container).wait().unwrap();
    assert_eq!(listed.len(), 2);
    let data = session.thread_data(listed[0].clone()).wait().unwrap();
    assert_eq!(data.name.as_deref(), Some("app"));

    session.resume(thread.clone()).wait().unwrap();
    wait_event(&events, |e| {
        matches!(e, Event::Resumed { context } if *context == thread)
    });
    assert_eq!(
        session.exec_state(thread).wait().unwrap(),
        Some(ExecState::Running)
    );
}

#[test]
#[serial]
fn test_foreign_context_rejected() {
    init_logger();
    let backend = FakeBackend::new(MI_BACKEND);
    let (first, _first_events) = running_session(&backend);
    let (second, _second_events) = running_session(&backend);

    let foreign = first.containers().wait().unwrap().remove(0);
    assert!(matches!(
        second.execution_contexts(foreign).wait(),
        Err(Error::InvalidContext(_))
    ));
}
