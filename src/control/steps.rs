//! Session initialization pipeline:
//! process launch, liveness monitor registration, service registration, inferior setup.
use crate::control::backend::launch::{self, Launched, TerminatePolicy};
use crate::control::backend::BackendState;
use crate::control::cache::CommandControl;
use crate::control::connection::Connection;
use crate::control::error::Error;
use crate::control::event::Event;
use crate::control::proto::CancelFlag;
use crate::control::sequence::{Done, Sequence, Step};
use crate::control::session::Core;
use crate::mi::MiCommand;
use crate::weak_error;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::Sender;

/// Launch in progress.
pub(crate) struct PendingLaunch {
    done: Done<Core>,
    /// Interrupt flag of the launch worker.
    pub interrupt: CancelFlag,
    /// Dropping it disarms the watchdog.
    _watchdog: Sender<()>,
}

pub(crate) fn pipeline() -> Rc<Sequence<Core>> {
    Sequence::new(vec![
        Step {
            name: "process-launch",
            initialize: launch_backend,
            shutdown: exit_backend,
        },
        Step {
            name: "liveness-monitor-registration",
            initialize: register_monitor,
            shutdown: |core, done| done(core, Ok(())),
        },
        Step {
            name: "service-registration",
            initialize: |core, done| {
                core.bus.register(core.id);
                done(core, Ok(()))
            },
            shutdown: |core, done| {
                core.bus.unregister(core.id);
                done(core, Ok(()))
            },
        },
        Step {
            name: "inferior-setup",
            initialize: setup_inferior,
            shutdown: |core, done| done(core, Ok(())),
        },
    ])
}

// ---------------------------------------- launch ---------------------------------------------

fn launch_backend(core: &mut Core, done: Done<Core>) {
    let command_line = match core.config.command_line() {
        Ok(line) => line,
        Err(e) => return done(core, Err(e)),
    };
    log::info!(target: "backend", "launch {command_line:?}");

    let budget = core.config.launch_timeout();
    let executor = core.executor.clone();
    let watchdog = launch::spawn_watchdog(budget, move || {
        executor.post(move |core: &mut Core| core.on_launch_timeout());
    });

    let interrupt = CancelFlag::default();
    core.launch = Some(PendingLaunch {
        done,
        interrupt: interrupt.clone(),
        _watchdog: watchdog,
    });

    let executor = core.executor.clone();
    launch::spawn_launch_worker(
        command_line,
        interrupt,
        core.backend.launch_interrupted_flag(),
        move |result| {
            executor.post(move |core: &mut Core| core.on_launched(result));
        },
    );
}

/// Ask the backend to quit, then make sure it is gone.
fn exit_backend(core: &mut Core, done: Done<Core>) {
    if core.backend.state() == BackendState::Started && !core.backend.is_exited() {
        if let Some(conn) = core.connection.as_mut() {
            weak_error!(conn.send_detached(MiCommand::gdb_exit()), "send exit command:");
        }
    }
    core.destroy(done)
}

impl Core {
    pub(crate) fn on_launch_timeout(&mut self) {
        let Some(launch) = self.launch.take() else {
            return;
        };
        let budget = self.config.launch_timeout();
        log::warn!(target: "backend", "no prompt in {budget:?}, interrupt launch");
        launch.interrupt.cancel();
        (launch.done)(self, Err(Error::LaunchTimeout(budget)))
    }

    pub(crate) fn on_launched(&mut self, result: Result<Launched, Error>) {
        let Some(launch) = self.launch.take() else {
            // launch already timed out
            if let Ok(mut launched) = result {
                log::warn!(target: "backend", "late launch result, kill pid {}", launched.child.id());
                weak_error!(launched.child.kill(), "kill late backend:");
                weak_error!(launched.child.wait(), "wait late backend:");
            }
            return;
        };

        let launched = match result {
            Ok(launched) => launched,
            Err(e) => return (launch.done)(self, Err(e)),
        };

        let Launched {
            child,
            stdin,
            reader,
            early_records,
        } = launched;
        log::info!(target: "backend", "backend started, pid {}", child.id());
        self.backend.set_started(child);
        self.connection = Some(Connection::new(Box::new(stdin)));
        self.publish(Event::BackendStateChanged(BackendState::Started));

        let executor = self.executor.clone();
        launch::spawn_reader(reader, self.backend.reader_stop(), move |record| {
            executor.post(move |core: &mut Core| core.dispatch(record))
        });
        for record in early_records {
            self.dispatch(record);
        }

        (launch.done)(self, Ok(()))
    }

    /// Terminate the backend: SIGTERM and polling of the exit flag with bounded retries.
    /// Concurrent calls share one termination.
    pub(crate) fn destroy(&mut self, done: Done<Core>) {
        if self.backend.state() != BackendState::Started || self.backend.is_exited() {
            return done(self, Ok(()));
        }
        // exit flag is maintained by the monitor, it must run
        if let Some(child) = self.backend.take_child() {
            self.spawn_monitor(child);
        }

        if let Some(waiters) = self.terminating.as_mut() {
            waiters.push(done);
            return;
        }
        self.terminating = Some(vec![done]);

        let Some(pid) = self.backend.pid() else {
            return self.on_terminated(Ok(()));
        };
        let policy = TerminatePolicy {
            retries: self.config.debugger.terminate_retries,
            backoff: self.config.terminate_backoff(),
        };
        let executor = self.executor.clone();
        launch::spawn_terminator(pid, self.backend.exited_flag(), policy, move |result| {
            executor.post(move |core: &mut Core| core.on_terminated(result));
        });
    }

    fn on_terminated(&mut self, result: Result<(), Error>) {
        if let Err(e) = &result {
            log::warn!(target: "backend", "{e}");
        }
        for done in self.terminating.take().unwrap_or_default() {
            done(self, result.clone());
        }
    }

    fn spawn_monitor(&mut self, child: std::process::Child) {
        let executor = self.executor.clone();
        launch::spawn_monitor(child, self.backend.exited_flag(), move |code| {
            executor.post(move |core: &mut Core| core.on_backend_exited(code));
        });
    }

    pub(crate) fn on_backend_exited(&mut self, code: Option<i32>) {
        if !self.backend.set_terminated(code) {
            return;
        }
        log::info!(target: "backend", "backend exited, code {code:?}");
        if let Some(mut conn) = self.connection.take() {
            for reply in conn.take_pending() {
                reply(self, Err(Error::BackendNotRunning));
            }
        }
        self.publish(Event::BackendStateChanged(BackendState::Terminated));
    }
}

// --------------------------------------- monitor ---------------------------------------------

fn register_monitor(core: &mut Core, done: Done<Core>) {
    match core.backend.take_child() {
        Some(child) => {
            core.spawn_monitor(child);
            done(core, Ok(()))
        }
        None => done(core, Err(Error::BackendNotRunning)),
    }
}

// ------------------------------------ inferior setup -----------------------------------------

fn setup_inferior(core: &mut Core, done: Done<Core>) {
    match core.config.inferior_setup_commands() {
        Ok(commands) => run_commands(core, commands.into(), done),
        Err(e) => done(core, Err(e)),
    }
}

/// Issue commands one after another, stop at the first failure.
fn run_commands(core: &mut Core, mut commands: VecDeque<MiCommand>, done: Done<Core>) {
    let Some(command) = commands.pop_front() else {
        return done(core, Ok(()));
    };
    core.queue_command(
        command,
        Box::new(move |core: &mut Core, result| match result {
            Ok(_) => run_commands(core, commands, done),
            Err(e) => done(core, Err(e)),
        }),
    );
}
