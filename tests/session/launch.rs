use crate::common::{init_logger, poll, FakeBackend, MI_BACKEND};
use mi_control::control::{BackendState, Error, LaunchConfig, SessionBuilder};
use serial_test::serial;

#[test]
#[serial]
fn test_launch_timeout() {
    init_logger();
    let backend = FakeBackend::new("exec sleep 30");
    let mut config = backend.config();
    config.debugger.launch_timeout_ms = 300;

    let (session, started) = SessionBuilder::new(config).start().unwrap();
    assert!(matches!(started.wait(), Err(Error::LaunchTimeout(_))));

    // the worker kills the half-started backend after the timeout is reported
    poll(|| session.launch_interrupted().wait().unwrap().then_some(()));
    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::NotInitialized
    );
    assert!(session.shutdown().wait().is_ok());
}

#[test]
#[serial]
fn test_launch_failure_is_not_timeout() {
    init_logger();
    let backend = FakeBackend::new("echo 'not a debugger'\nexit 1");
    let (session, started) = SessionBuilder::new(backend.config()).start().unwrap();

    let err = started.wait().unwrap_err();
    assert!(matches!(err, Error::LaunchFailure(_)), "{err}");
    assert!(err.is_fatal());
    assert!(!session.launch_interrupted().wait().unwrap());
}

#[test]
#[serial]
fn test_missing_debugger() {
    init_logger();
    let config = LaunchConfig::from_attributes([("debugger.path", "mi-control-no-such-debugger")])
        .unwrap();
    let (_session, started) = SessionBuilder::new(config).start().unwrap();
    assert!(matches!(started.wait(), Err(Error::LaunchFailure(_))));
}

#[test]
#[serial]
fn test_inferior_setup_failure_aborts_initialization() {
    init_logger();
    let script = MI_BACKEND.replace(
        "        *-gdb-exit*)",
        "        *-file-exec-and-symbols*)\n            printf '%s^error,msg=\"No such file.\"\\n(gdb)\\n' \"$token\" ;;\n        *-gdb-exit*)",
    );
    let backend = FakeBackend::new(&script);
    let mut config = backend.config();
    config.program.path = Some("/no/such/program".into());
    config.program.arguments = vec!["--flag".to_string()];

    let (session, started) = SessionBuilder::new(config).start().unwrap();
    match started.wait() {
        Err(Error::Protocol { command, message, .. }) => {
            assert_eq!(command, "-file-exec-and-symbols /no/such/program");
            assert_eq!(message, "No such file.");
        }
        other => panic!("unexpected initialization result: {other:?}"),
    }
    // completed steps stay initialized until shutdown
    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::Started
    );
    session.shutdown().wait().unwrap();
    assert_eq!(
        session.backend_state().wait().unwrap(),
        BackendState::Terminated
    );
}

#[test]
#[serial]
fn test_configuration_from_toml() {
    let config: LaunchConfig = toml::from_str(
        r#"
        [debugger]
        path = "/usr/bin/gdb"
        launch_timeout_ms = 1000

        [program]
        path = "/bin/ls"
        arguments = ["-l", "/tmp"]
        "#,
    )
    .unwrap();
    assert_eq!(config.debugger.launch_timeout_ms, 1000);
    assert_eq!(config.debugger.terminate_retries, 10);
    let commands: Vec<_> = config
        .inferior_setup_commands()
        .unwrap()
        .iter()
        .map(|c| c.signature())
        .collect();
    assert_eq!(
        commands,
        vec!["-file-exec-and-symbols /bin/ls", "-exec-arguments -l /tmp"]
    );
}
