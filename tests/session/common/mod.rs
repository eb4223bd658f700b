use mi_control::control::{DebuggerConfig, Event, LaunchConfig};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Script answering every command with `^done`. `-exec-run` starts a fake inferior with
/// two threads, `--available` lists it, `-gdb-exit` quits.
pub const MI_BACKEND: &str = r#"
printf '(gdb)\n'
while read -r line; do
    token=${line%%-*}
    case "$line" in
        *--available*)
            printf '%s^done,groups=[{id="7",type="process",description="init"},{id="42",type="process",description="app"}]\n(gdb)\n' "$token" ;;
        *-exec-run*)
            printf '=thread-group-started,id="i1",pid="42"\n'
            printf '=thread-created,id="1",group-id="i1"\n'
            printf '=thread-created,id="2",group-id="i1"\n'
            printf '%s^running\n*running,thread-id="all"\n(gdb)\n' "$token" ;;
        *-exec-interrupt*)
            printf '%s^done\n*stopped,reason="signal-received",signal-name="SIGINT",thread-id="1",stopped-threads="all"\n(gdb)\n' "$token" ;;
        *"-list-thread-groups i1"*)
            printf '%s^done,threads=[{id="1",target-id="LWP 42",state="stopped"},{id="2",target-id="LWP 43",state="stopped"}]\n(gdb)\n' "$token" ;;
        *-exec-continue*)
            printf '%s^running\n*running,thread-id="1"\n(gdb)\n' "$token" ;;
        *-thread-info*)
            printf '%s^done,threads=[{id="1",target-id="LWP 42",name="app",state="stopped",core="0"}]\n(gdb)\n' "$token" ;;
        *-gdb-exit*)
            printf '%s^exit\n' "$token"
            exit 0 ;;
        *)
            printf '%s^done\n(gdb)\n' "$token" ;;
    esac
done
"#;

/// Executable shell script standing in for the debugger.
pub struct FakeBackend {
    path: PathBuf,
}

impl FakeBackend {
    pub fn new(body: &str) -> Self {
        let path = std::env::temp_dir().join(format!("mi-backend-{}.sh", uuid::Uuid::new_v4()));
        fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { path }
    }

    pub fn config(&self) -> LaunchConfig {
        LaunchConfig {
            debugger: DebuggerConfig {
                path: self.path.clone(),
                launch_timeout_ms: 5_000,
                terminate_retries: 10,
                terminate_backoff_ms: 50,
            },
            ..LaunchConfig::default()
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        _ = fs::remove_file(&self.path);
    }
}

pub fn init_logger() {
    _ = env_logger::builder().is_test(true).try_init();
}

/// Receive events until one matches.
pub fn wait_event<F>(events: &Receiver<Event>, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = events
            .recv_timeout(left)
            .expect("expected event not received");
        if predicate(&event) {
            return event;
        }
    }
}

/// Call `f` until it returns `Some`.
pub fn poll<T, F>(mut f: F) -> T
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + WAIT;
    loop {
        if let Some(value) = f() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition not reached in {WAIT:?}");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[macro_export]
macro_rules! assert_no_proc {
    ($pid:expr) => {
        let sys = sysinfo::System::new_with_specifics(
            sysinfo::RefreshKind::new().with_processes(sysinfo::ProcessRefreshKind::new()),
        );
        let alive = sysinfo::System::process(&sys, sysinfo::Pid::from_u32($pid as u32))
            .map(|p| p.status() != sysinfo::ProcessStatus::Zombie)
            .unwrap_or(false);
        assert!(!alive, "process {} is still alive", $pid)
    };
}
