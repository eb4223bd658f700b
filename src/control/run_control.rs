//! Execution state of thread groups and threads.
use crate::control::context::{Capability, Context, ExecutionContext};
use crate::control::error::Error;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use strum_macros::{EnumString, IntoStaticStr};

/// Why execution stopped, as reported by the `reason` field of a stop notification.
#[derive(Clone, Debug, Default, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum StopReason {
    BreakpointHit,
    WatchpointTrigger,
    ReadWatchpointTrigger,
    AccessWatchpointTrigger,
    FunctionFinished,
    LocationReached,
    WatchpointScope,
    EndSteppingRange,
    ExitedSignalled,
    Exited,
    ExitedNormally,
    SignalReceived,
    SolibEvent,
    Fork,
    Vfork,
    SyscallEntry,
    SyscallReturn,
    Exec,
    NoHistory,
    /// No reason given, typically a stop after attach or interrupt.
    #[default]
    Unknown,
    #[strum(default)]
    Other(String),
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Other(reason) => f.write_str(reason),
            reason => {
                let name: &'static str = reason.into();
                f.write_str(name)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Suspended(StopReason),
    /// Terminal state, the thread may appear again only with a new creation notification.
    Exited,
}

impl ExecState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExecState::Running)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, ExecState::Suspended(_))
    }
}

/// Per-context execution state machine.
#[derive(Default)]
pub(crate) struct RunControl {
    /// by thread id
    threads: HashMap<String, ExecState>,
    /// by group id
    groups: HashMap<String, ExecState>,
    /// Threads with a notified or synthesized exit. Not listed by enumerations until
    /// created again.
    exited: HashSet<String>,
    /// Last canonical enumeration of a group.
    enumerations: HashMap<String, Vec<ExecutionContext>>,
}

impl RunControl {
    pub fn state(&self, context: &Context) -> Result<Option<&ExecState>, Error> {
        match context {
            Context::Execution(e) => Ok(self.threads.get(e.id())),
            Context::Container(c) => Ok(self.groups.get(c.id())),
            _ => Err(Error::NotSupported("run control of this context")),
        }
    }

    pub fn thread_state(&self, thread_id: &str) -> Option<&ExecState> {
        self.threads.get(thread_id)
    }

    fn check_run_control(context: &Context) -> Result<(), Error> {
        if context.has_capability(Capability::RunControl) {
            Ok(())
        } else {
            Err(Error::NotSupported("run control of this context"))
        }
    }

    pub fn can_suspend(&self, context: &Context) -> bool {
        matches!(self.state(context), Ok(Some(ExecState::Running)))
    }

    pub fn can_resume(&self, context: &Context) -> bool {
        matches!(self.state(context), Ok(Some(ExecState::Suspended(_))))
    }

    pub fn check_suspend(&self, context: &Context) -> Result<(), Error> {
        Self::check_run_control(context)?;
        if !self.can_suspend(context) {
            return Err(self.invalid_state(context, "suspend"));
        }
        Ok(())
    }

    pub fn check_resume(&self, context: &Context) -> Result<(), Error> {
        Self::check_run_control(context)?;
        if !self.can_resume(context) {
            return Err(self.invalid_state(context, "resume"));
        }
        Ok(())
    }

    fn invalid_state(&self, context: &Context, action: &str) -> Error {
        let state = match self.state(context) {
            Ok(Some(state)) => format!("{state:?}"),
            _ => "unknown state".to_string(),
        };
        Error::InvalidState(format!("can't {action} {context} in {state}"))
    }

    // ------------------------------- notifications ---------------------------------------

    pub fn group_started(&mut self, group_id: &str) {
        self.groups
            .insert(group_id.to_string(), ExecState::Running);
    }

    /// Mark group threads as exited and forget its enumeration.
    pub fn group_exited(&mut self, group_id: &str, threads: &[String]) {
        self.groups.insert(group_id.to_string(), ExecState::Exited);
        for tid in threads {
            self.thread_exited(tid);
        }
        if let Some(listed) = self.enumerations.remove(group_id) {
            for ctx in listed {
                self.thread_exited(ctx.id());
            }
        }
    }

    /// A (possibly reused) thread id starts a new life.
    pub fn thread_started(&mut self, thread_id: &str) {
        self.exited.remove(thread_id);
        self.threads
            .insert(thread_id.to_string(), ExecState::Running);
    }

    pub fn thread_exited(&mut self, thread_id: &str) {
        self.exited.insert(thread_id.to_string());
        self.threads
            .insert(thread_id.to_string(), ExecState::Exited);
        for listed in self.enumerations.values_mut() {
            listed.retain(|ctx| ctx.id() != thread_id);
        }
    }

    pub fn is_exited(&self, thread_id: &str) -> bool {
        self.exited.contains(thread_id)
    }

    /// Set state of a thread and its group. Exited threads keep their state.
    pub fn set_thread_state(&mut self, thread_id: &str, group_id: Option<&str>, state: ExecState) {
        if !self.is_exited(thread_id) {
            self.threads.insert(thread_id.to_string(), state.clone());
        }
        if let Some(gid) = group_id {
            self.set_group_state(gid, state);
        }
    }

    /// Set state of every live thread and group.
    pub fn set_all_states(&mut self, state: ExecState) {
        for s in self.threads.values_mut().chain(self.groups.values_mut()) {
            if *s != ExecState::Exited {
                *s = state.clone();
            }
        }
    }

    pub fn set_group_state(&mut self, group_id: &str, state: ExecState) {
        match self.groups.get(group_id) {
            Some(ExecState::Exited) => {}
            _ => {
                self.groups.insert(group_id.to_string(), state);
            }
        }
    }

    /// Protocol compatibility shim for backends that keep listing threads after their exit
    /// notification, or never notify about the exit at all.
    ///
    /// Drop threads with a known exit from a fresh enumeration, then diff it by thread id
    /// against the previous canonical enumeration of the group. Return the new canonical list and
    /// contexts that disappeared; those are marked exited before the list is replaced.
    pub fn reconcile(
        &mut self,
        group_id: &str,
        listed: Vec<ExecutionContext>,
    ) -> (Vec<ExecutionContext>, Vec<ExecutionContext>) {
        let listed: Vec<_> = listed
            .into_iter()
            .filter(|ctx| !self.is_exited(ctx.id()))
            .collect();

        let vanished: Vec<_> = self
            .enumerations
            .get(group_id)
            .map(|previous| {
                previous
                    .iter()
                    .filter(|ctx| !listed.iter().any(|l| l.id() == ctx.id()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for ctx in &vanished {
            self.thread_exited(ctx.id());
        }
        for ctx in &listed {
            self.threads
                .entry(ctx.id().to_string())
                .or_insert(ExecState::Running);
        }

        self.enumerations
            .insert(group_id.to_string(), listed.clone());
        (listed, vanished)
    }
}
