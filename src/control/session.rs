//! Executor side of a session. Everything here runs on the session thread.
use crate::control::backend::{Backend, BackendState};
use crate::control::cache::{CommandCache, CommandControl, Reply};
use crate::control::config::LaunchConfig;
use crate::control::connection::Connection;
use crate::control::context::{
    self, Capability, ContainerContext, Context, ExecutionContext, ProcessContext, SessionId,
};
use crate::control::error::Error;
use crate::control::event::{Event, EventBus};
use crate::control::proto::{Executor, Promise};
use crate::control::registry::{ContextRegistry, ProcessData, FALLBACK_THREAD_ID};
use crate::control::run_control::{ExecState, RunControl};
use crate::control::sequence::{Done, Sequence};
use crate::control::steps::{self, PendingLaunch};
use crate::mi::{MiCommand, ResultRecord, Results, Value};
use std::mem;
use std::rc::Rc;

/// Thread description returned by `-thread-info`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreadData {
    pub id: String,
    pub target_id: Option<String>,
    pub name: Option<String>,
    /// Backend reported state, `stopped` or `running`.
    pub state: Option<String>,
    pub core: Option<String>,
}

/// A process the backend may attach to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessInfo {
    pub pid: String,
    pub name: Option<String>,
    pub user: Option<String>,
}

pub(crate) struct Core {
    pub id: SessionId,
    pub config: LaunchConfig,
    pub executor: Executor<Core>,
    pub bus: EventBus,

    pub backend: Backend,
    pub connection: Option<Connection<Core>>,
    pub launch: Option<PendingLaunch>,
    /// Callers waiting for the backend termination in progress.
    pub terminating: Option<Vec<Done<Core>>>,

    pub registry: ContextRegistry,
    pub run_control: RunControl,

    /// `-list-thread-groups <group>` replies, by container.
    pub container_cache: CommandCache<Core>,
    /// `-thread-info <thread>` replies, by execution context.
    pub thread_cache: CommandCache<Core>,
    /// `-list-thread-groups --available`, shared only while in flight.
    pub process_list_cache: CommandCache<Core>,

    sequence: Rc<Sequence<Core>>,
    shutdown_waiters: Vec<Done<Core>>,
}

impl CommandControl for Core {
    fn queue_command(&mut self, command: MiCommand, reply: Reply<Self>) {
        let Some(conn) = self.connection.as_mut() else {
            return reply(self, Err(Error::BackendNotRunning));
        };
        if let Err((e, reply)) = conn.send(command, reply) {
            reply(self, Err(e));
        }
    }
}

impl Core {
    pub fn new(id: SessionId, config: LaunchConfig, executor: Executor<Core>, bus: EventBus) -> Self {
        Self {
            id,
            config,
            executor,
            bus,
            backend: Backend::default(),
            connection: None,
            launch: None,
            terminating: None,
            registry: ContextRegistry::new(id),
            run_control: RunControl::default(),
            container_cache: CommandCache::new("container"),
            thread_cache: CommandCache::new("thread"),
            process_list_cache: CommandCache::always_reset("process list"),
            sequence: steps::pipeline(),
            shutdown_waiters: vec![],
        }
    }

    pub fn container_cache(&mut self) -> &mut CommandCache<Core> {
        &mut self.container_cache
    }

    pub fn thread_cache(&mut self) -> &mut CommandCache<Core> {
        &mut self.thread_cache
    }

    pub fn process_list_cache(&mut self) -> &mut CommandCache<Core> {
        &mut self.process_list_cache
    }

    pub fn publish(&self, event: Event) {
        self.bus.publish(self.id, event)
    }

    // ------------------------------------- lifecycle -----------------------------------------

    /// Run the initialization pipeline.
    pub fn start(&mut self, promise: Promise<()>) {
        if self.sequence.is_running()
            || !self.sequence.initialized_steps().is_empty()
            || self.backend.state() != BackendState::NotInitialized
        {
            return promise.resolve(Err(Error::InvalidState(
                "session already started".to_string(),
            )));
        }

        log::info!(target: "session", "{}: start", self.id);
        let seq = self.sequence.clone();
        seq.initialize(
            self,
            Box::new(move |core: &mut Core, result| {
                match &result {
                    Ok(()) => log::info!(target: "session", "{}: initialized", core.id),
                    Err(e) => log::warn!(target: "session", "{}: initialization failed: {e}", core.id),
                }
                promise.resolve(result);
                if !core.shutdown_waiters.is_empty() {
                    core.begin_shutdown();
                }
            }),
        );
    }

    /// Release initialized steps in reverse order. A shutdown requested during
    /// initialization stops it before the next step and runs after it.
    pub fn shutdown(&mut self, done: Done<Core>) {
        self.shutdown_waiters.push(done);
        if self.shutdown_waiters.len() > 1 {
            return;
        }

        if self.sequence.is_running() {
            log::debug!(target: "session", "{}: shutdown deferred until initialization stops", self.id);
            self.sequence.abort();
            if let Some(launch) = &self.launch {
                launch.interrupt.cancel();
            }
            return;
        }
        self.begin_shutdown();
    }

    fn begin_shutdown(&mut self) {
        log::info!(target: "session", "{}: shutdown", self.id);
        let seq = self.sequence.clone();
        seq.shutdown(
            self,
            Box::new(|core: &mut Core, result| {
                for done in mem::take(&mut core.shutdown_waiters) {
                    done(core, result.clone());
                }
            }),
        );
    }

    /// Shutdown and stop the executor, the last handle is gone.
    pub fn close(&mut self) {
        self.shutdown(Box::new(|core: &mut Core, result| {
            crate::weak_error!(result, "shutdown on close:");
            core.backend.reader_stop().cancel();
            core.bus.close(core.id);
            core.executor.stop();
        }));
    }

    // -------------------------------------- queries ------------------------------------------

    pub fn check_session(&self, context: &Context) -> Result<(), Error> {
        if context.session() != self.id {
            return Err(Error::InvalidContext(format!(
                "{context} belongs to another session"
            )));
        }
        Ok(())
    }

    pub fn process_data(&self, process: &ProcessContext) -> Result<ProcessData, Error> {
        self.check_session(&Context::Process(process.clone()))?;
        Ok(self.registry.process_data(process))
    }

    /// Enumerate threads of a group. Every successful enumeration passes through the
    /// exit reconciliation, vanished threads are announced as exited first.
    pub fn execution_contexts(
        &mut self,
        container: ContainerContext,
        promise: Promise<Vec<ExecutionContext>>,
    ) {
        let context = Context::Container(container.clone());
        if let Err(e) = self.check_session(&context) {
            return promise.resolve(Err(e));
        }

        let command = MiCommand::list_threads_of_group(container.id());
        CommandCache::execute(
            self,
            Core::container_cache,
            context,
            command,
            Box::new(move |core: &mut Core, result| {
                let result = result.and_then(|record| core.on_thread_list(&container, &record));
                promise.resolve(result)
            }),
        );
    }

    fn on_thread_list(
        &mut self,
        container: &ContainerContext,
        record: &ResultRecord,
    ) -> Result<Vec<ExecutionContext>, Error> {
        let threads = record
            .results
            .get_list("threads")
            .ok_or_else(|| malformed(record, "no thread list"))?;

        let mut listed = vec![];
        for thread in threads {
            let id = thread
                .as_tuple()
                .and_then(|t| t.get_str("id"))
                .ok_or_else(|| malformed(record, "thread without id"))?;
            let thread = self
                .registry
                .create_thread_context(container.process().clone(), id);
            listed.push(
                self.registry
                    .create_execution_context(container.clone(), thread)?,
            );
        }

        let (canonical, vanished) = self.run_control.reconcile(container.id(), listed);
        for ctx in vanished {
            log::debug!(target: "dispatch", "thread {} vanished from enumeration", ctx.id());
            self.registry.thread_exited(ctx.id());
            self.thread_cache
                .reset_context(&Context::Execution(ctx.clone()));
            self.publish(Event::ThreadExited(ctx));
        }

        if !canonical.is_empty() {
            return Ok(canonical);
        }
        let known: Vec<_> = self
            .registry
            .execution_contexts(container)
            .into_iter()
            .filter(|ctx| !self.run_control.is_exited(ctx.id()))
            .collect();
        if known.is_empty() {
            let thread = self
                .registry
                .create_thread_context(container.process().clone(), FALLBACK_THREAD_ID);
            return Ok(vec![context::execution_unchecked(container.clone(), thread)]);
        }
        Ok(known)
    }

    pub fn thread_data(&mut self, context: ExecutionContext, promise: Promise<ThreadData>) {
        let ctx = Context::Execution(context.clone());
        if let Err(e) = self.check_session(&ctx) {
            return promise.resolve(Err(e));
        }

        CommandCache::execute(
            self,
            Core::thread_cache,
            ctx,
            MiCommand::thread_info(context.id()),
            Box::new(move |_: &mut Core, result| {
                promise.resolve(result.and_then(|record| parse_thread_info(&record, context.id())))
            }),
        );
    }

    pub fn attachable_processes(&mut self, promise: Promise<Vec<ProcessInfo>>) {
        let control = Context::Control(self.registry.control_context());
        CommandCache::execute(
            self,
            Core::process_list_cache,
            control,
            MiCommand::list_available_processes(),
            Box::new(move |_: &mut Core, result| {
                promise.resolve(result.and_then(|record| parse_process_list(&record)))
            }),
        );
    }

    /// Resolve a process name through the process list.
    pub fn resolve_process_name(&mut self, pid: String) {
        let control = Context::Control(self.registry.control_context());
        CommandCache::execute(
            self,
            Core::process_list_cache,
            control,
            MiCommand::list_available_processes(),
            Box::new(move |core: &mut Core, result| {
                let processes = crate::weak_error!(
                    result.and_then(|record| parse_process_list(&record)),
                    "resolve process name:"
                );
                let name = processes
                    .unwrap_or_default()
                    .into_iter()
                    .find(|p| p.pid == pid)
                    .and_then(|p| p.name);
                match name {
                    Some(name) => core.registry.set_process_name(&pid, &name),
                    None => log::debug!(target: "dispatch", "no name for process {pid}"),
                }
            }),
        );
    }

    // ------------------------------------ run control ----------------------------------------

    pub fn exec_state(&self, context: &Context) -> Result<Option<ExecState>, Error> {
        self.check_session(context)?;
        self.run_control.state(context).map(|s| s.cloned())
    }

    /// Interrupt a running context. The state changes only when the stop is reported.
    pub fn suspend(&mut self, context: &Context) -> Result<(), Error> {
        self.check_session(context)?;
        self.run_control.check_suspend(context)?;
        self.backend.interrupt()
    }

    pub fn resume(&mut self, context: Context, promise: Promise<()>) {
        let checked = self
            .check_session(&context)
            .and_then(|_| self.run_control.check_resume(&context));
        if let Err(e) = checked {
            return promise.resolve(Err(e));
        }

        let command = match &context {
            Context::Execution(e) => MiCommand::exec_continue().thread(e.id()),
            Context::Container(c) => MiCommand::exec_continue().thread_group(c.id()),
            _ => return promise.resolve(Err(Error::NotSupported("resume of this context"))),
        };
        debug_assert!(context.has_capability(Capability::RunControl));
        self.queue_command(
            command,
            Box::new(move |_: &mut Core, result| promise.resolve(result.map(|_| ()))),
        );
    }
}

fn malformed(record: &ResultRecord, what: &'static str) -> Error {
    Error::MalformedReply(record.results.to_string(), what)
}

fn tuples(list: &[Value]) -> impl Iterator<Item = &Results> {
    list.iter().filter_map(Value::as_tuple)
}

fn parse_thread_info(record: &ResultRecord, thread_id: &str) -> Result<ThreadData, Error> {
    let threads = record
        .results
        .get_list("threads")
        .ok_or_else(|| malformed(record, "no thread list"))?;
    let info = tuples(threads)
        .find(|t| t.get_str("id") == Some(thread_id))
        .ok_or_else(|| Error::InvalidContext(format!("unknown thread id `{thread_id}`")))?;

    let field = |key: &str| info.get_str(key).map(ToString::to_string);
    Ok(ThreadData {
        id: thread_id.to_string(),
        target_id: field("target-id"),
        name: field("name"),
        state: field("state"),
        core: field("core"),
    })
}

fn parse_process_list(record: &ResultRecord) -> Result<Vec<ProcessInfo>, Error> {
    let groups = record
        .results
        .get_list("groups")
        .ok_or_else(|| malformed(record, "no group list"))?;
    Ok(tuples(groups)
        .filter_map(|g| {
            Some(ProcessInfo {
                pid: g.get_str("id")?.to_string(),
                name: g.get_str("description").map(ToString::to_string),
                user: g.get_str("user").map(ToString::to_string),
            })
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::control::connection::test::RecordingWriter;
    use crate::control::proto::{self, task_queue, Pending, TaskQueue};
    use crate::mi::Record;
    use std::sync::mpsc::Receiver;

    /// Core with a fake connection. Commands are recorded, replies are fed by hand.
    pub struct Harness {
        pub core: Core,
        pub writer: RecordingWriter,
        pub events: Receiver<Event>,
        _queue: TaskQueue<Core>,
    }

    impl Harness {
        pub fn new() -> Self {
            let (executor, queue) = task_queue();
            let bus = EventBus::new();
            let id = SessionId::new();
            let events = bus.subscribe(id);
            let mut core = Core::new(id, LaunchConfig::default(), executor, bus);
            let writer = RecordingWriter::default();
            core.connection = Some(Connection::new(Box::new(writer.clone())));
            Self {
                core,
                writer,
                events,
                _queue: queue,
            }
        }

        pub fn feed(&mut self, line: &str) {
            self.core.dispatch(Record::parse(line).unwrap());
        }

        /// Reply to the last written command.
        pub fn reply(&mut self, payload: &str) {
            let line = self.writer.lines().pop().unwrap();
            let token: String = line.chars().take_while(char::is_ascii_digit).collect();
            self.feed(&format!("{token}{payload}"));
        }

        pub fn sent(&self) -> Vec<String> {
            self.writer
                .lines()
                .into_iter()
                .map(|l| l.trim_start_matches(|c: char| c.is_ascii_digit()).to_string())
                .collect()
        }

        pub fn drain_events(&self) -> Vec<Event> {
            self.events.try_iter().collect()
        }
    }

    fn resolved<T>(pending: Pending<T>) -> Result<T, Error> {
        pending.try_get().expect("request must be resolved")
    }

    #[test]
    fn test_enumeration_is_cached_until_invalidated() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        let container = h.core.registry.container("i1");

        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        h.reply(r#"^done,threads=[{id="1"},{id="2"}]"#);
        assert_eq!(resolved(pending).unwrap().len(), 2);

        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        assert_eq!(resolved(pending).unwrap().len(), 2);
        assert_eq!(
            h.sent()
                .iter()
                .filter(|c| *c == "-list-thread-groups i1")
                .count(),
            1
        );

        h.feed(r#"=thread-created,id="3",group-id="i1""#);
        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container, promise);
        assert!(pending.try_get().is_none());
        assert_eq!(h.sent().last().unwrap(), "-list-thread-groups i1");
    }

    #[test]
    fn test_vanished_thread_raises_synthetic_exit() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        let container = h.core.registry.container("i1");

        let (promise, _pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        h.reply(r#"^done,threads=[{id="A"},{id="B"},{id="C"}]"#);
        h.drain_events();

        h.core.container_cache.reset();
        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        h.reply(r#"^done,threads=[{id="A"},{id="C"}]"#);

        let exits: Vec<_> = h
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                Event::ThreadExited(ctx) => Some(ctx.id().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(exits, vec!["B"]);
        let ids: Vec<_> = resolved(pending)
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[test]
    fn test_empty_enumeration_falls_back() {
        let mut h = Harness::new();
        let container = h.core.registry.container("i1");
        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container, promise);
        h.reply("^done,threads=[]");
        let contexts = resolved(pending).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id(), FALLBACK_THREAD_ID);
    }

    #[test]
    fn test_empty_enumeration_keeps_exited_threads_out() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="A",group-id="i1""#);
        h.feed(r#"=thread-created,id="B",group-id="i1""#);
        let container = h.core.registry.container("i1");

        let (promise, _pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        h.reply(r#"^done,threads=[{id="A"},{id="B"}]"#);

        h.core.container_cache.reset();
        let (promise, _pending) = proto::promise();
        h.core.execution_contexts(container.clone(), promise);
        h.reply(r#"^done,threads=[{id="A"}]"#);
        assert!(h.core.run_control.is_exited("B"));

        h.feed(r#"=thread-exited,id="A",group-id="i1""#);
        h.core.container_cache.reset();
        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container, promise);
        h.reply("^done,threads=[]");

        let ids: Vec<_> = resolved(pending)
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec![FALLBACK_THREAD_ID]);
    }

    #[test]
    fn test_thread_data_survives_resume_and_stop() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="1",group-id="i1""#);
        let ctx = h.core.registry.execution_context("i1", "1");

        let (promise, pending) = proto::promise();
        h.core.thread_data(ctx.clone(), promise);
        h.reply(r#"^done,threads=[{id="1",target-id="LWP 42",name="app",state="stopped",core="0"}],current-thread-id="1""#);
        assert!(resolved(pending).is_ok());
        let round_trips = h.sent().len();

        h.feed(r#"*running,thread-id="all""#);
        h.feed(r#"*stopped,reason="signal-received",signal-name="SIGINT",thread-id="1",stopped-threads="all""#);

        let (promise, pending) = proto::promise();
        h.core.thread_data(ctx, promise);
        assert_eq!(resolved(pending).unwrap().name.as_deref(), Some("app"));
        assert_eq!(h.sent().len(), round_trips);
    }

    #[test]
    fn test_stopped_thread_is_served_from_cache_in_non_stop_mode() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="1",group-id="i1""#);
        h.feed(r#"=thread-created,id="2",group-id="i1""#);
        h.feed(r#"*running,thread-id="all""#);
        h.feed(r#"*stopped,reason="breakpoint-hit",thread-id="2",stopped-threads=["2"]"#);

        let second = h.core.registry.execution_context("i1", "2");
        let (promise, pending) = proto::promise();
        h.core.thread_data(second.clone(), promise);
        h.reply(r#"^done,threads=[{id="2",target-id="LWP 43",state="stopped"}]"#);
        assert!(resolved(pending).is_ok());
        let round_trips = h.sent().len();

        let (promise, pending) = proto::promise();
        h.core.thread_data(second, promise);
        assert!(resolved(pending).is_ok());
        assert_eq!(h.sent().len(), round_trips);

        // the other thread keeps running, its data is not cached
        let first = h.core.registry.execution_context("i1", "1");
        let (promise, pending) = proto::promise();
        h.core.thread_data(first, promise);
        assert!(pending.try_get().is_none());
        assert_eq!(h.sent().len(), round_trips + 1);
    }

    #[test]
    fn test_thread_data_and_unavailable_context() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="1",group-id="i1""#);
        let ctx = h.core.registry.execution_context("i1", "1");

        let (promise, pending) = proto::promise();
        h.core.thread_data(ctx.clone(), promise);
        h.reply(r#"^done,threads=[{id="1",target-id="LWP 42",name="app",state="stopped",core="0"}],current-thread-id="1""#);
        let data = resolved(pending).unwrap();
        assert_eq!(data.name.as_deref(), Some("app"));
        assert_eq!(data.target_id.as_deref(), Some("LWP 42"));

        let round_trips = h.sent().len();
        let (promise, pending) = proto::promise();
        h.core.thread_data(ctx.clone(), promise);
        assert!(resolved(pending).is_ok());
        assert_eq!(h.sent().len(), round_trips);

        h.feed(r#"*running,thread-id="all""#);
        let (promise, pending) = proto::promise();
        h.core.thread_data(ctx, promise);
        assert!(pending.try_get().is_none());
        assert_eq!(h.sent().len(), round_trips + 1);
    }

    #[test]
    fn test_protocol_error_resolves_only_its_request() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="1",group-id="i1""#);
        let ctx = h.core.registry.execution_context("i1", "1");

        let (promise, failed) = proto::promise();
        h.core.thread_data(ctx, promise);
        let (promise, listed) = proto::promise();
        h.core.execution_contexts(h.core.registry.container("i1"), promise);

        let lines = h.writer.lines();
        let token_of = |command: &str| -> String {
            let line = lines.iter().find(|l| l.ends_with(command)).unwrap();
            line.chars().take_while(char::is_ascii_digit).collect()
        };
        let (t_info, t_list) = (token_of("-thread-info 1"), token_of("-list-thread-groups i1"));
        h.feed(&format!(r#"{t_info}^error,msg="Invalid thread id: 1""#));
        assert!(matches!(resolved(failed), Err(Error::Protocol { .. })));
        assert!(listed.try_get().is_none());

        h.feed(&format!(r#"{t_list}^done,threads=[{{id="1"}}]"#));
        assert!(resolved(listed).is_ok());
    }

    #[test]
    fn test_process_name_resolution_scenario() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-created,id="i1",pid="42""#);
        let process = h.core.registry.process_of_group("i1");
        assert_eq!(h.core.process_data(&process).unwrap().name, None);

        assert_eq!(h.sent().last().unwrap(), "-list-thread-groups --available");
        h.reply(r#"^done,groups=[{id="7",type="process",description="init"},{id="42",type="process",description="app",user="me"}]"#);
        assert_eq!(
            h.core.process_data(&process).unwrap().name.as_deref(),
            Some("app")
        );
    }

    #[test]
    fn test_attachable_processes_share_request() {
        let mut h = Harness::new();
        let (p1, r1) = proto::promise();
        let (p2, r2) = proto::promise();
        h.core.attachable_processes(p1);
        h.core.attachable_processes(p2);
        assert_eq!(h.sent().len(), 1);
        h.reply(r#"^done,groups=[{id="42",description="app"}]"#);
        assert_eq!(resolved(r1).unwrap(), resolved(r2).unwrap());

        let (p3, _r3) = proto::promise();
        h.core.attachable_processes(p3);
        assert_eq!(h.sent().len(), 2);
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut h = Harness::new();
        h.feed(r#"=thread-group-started,id="i1",pid="42""#);
        h.feed(r#"=thread-created,id="1",group-id="i1""#);
        let exec: Context = h.core.registry.execution_context("i1", "1").into();
        let process: Context = h.core.registry.process_of_group("i1").into();

        assert!(matches!(h.core.suspend(&process), Err(Error::NotSupported(_))));
        // no local backend process, interrupt is a logged no-op
        assert!(h.core.suspend(&exec).is_ok());
        assert_eq!(h.core.exec_state(&exec).unwrap(), Some(ExecState::Running));

        let (promise, pending) = proto::promise();
        h.core.resume(exec.clone(), promise);
        assert!(matches!(resolved(pending), Err(Error::InvalidState(_))));

        h.feed(r#"*stopped,reason="breakpoint-hit",thread-id="1",stopped-threads="all""#);
        assert!(matches!(h.core.suspend(&exec), Err(Error::InvalidState(_))));
        let (promise, pending) = proto::promise();
        h.core.resume(exec, promise);
        assert_eq!(h.sent().last().unwrap(), "-exec-continue --thread 1");
        h.reply("^running");
        assert!(resolved(pending).is_ok());
    }

    #[test]
    fn test_foreign_context_is_rejected() {
        let mut h = Harness::new();
        let other = Harness::new();
        let container = other.core.registry.container("i1");
        let (promise, pending) = proto::promise();
        h.core.execution_contexts(container, promise);
        assert!(matches!(resolved(pending), Err(Error::InvalidContext(_))));
    }
}
