//! Debug session control over an external MI debugger.
//!
//! A session owns one backend process and one executor thread. Every mutation of session
//! state happens on that thread, the public [`SessionHandle`] only posts requests and hands
//! out [`Pending`] results. Lifecycle changes are broadcast through the [`EventBus`].
//!
//! ```no_run
//! use mi_control::control::{LaunchConfig, SessionBuilder};
//!
//! let (session, started) = SessionBuilder::new(LaunchConfig::default()).start().unwrap();
//! let events = session.events();
//! started.wait().unwrap();
//! session.shutdown().wait().unwrap();
//! # drop(events);
//! ```
pub mod backend;
mod cache;
pub mod config;
mod connection;
pub mod context;
mod dispatch;
pub mod error;
pub mod event;
pub mod proto;
pub mod registry;
pub mod run_control;
mod sequence;
mod session;
mod steps;

pub use backend::BackendState;
pub use config::{DebuggerConfig, LaunchConfig, ProgramConfig};
pub use context::{
    Capability, ContainerContext, Context, ControlContext, ExecutionContext, ProcessContext,
    SessionId, ThreadContext,
};
pub use error::Error;
pub use event::{Event, EventBus};
pub use proto::Pending;
pub use registry::ProcessData;
pub use run_control::{ExecState, StopReason};
pub use session::{ProcessInfo, ThreadData};

use crate::mi::{MiCommand, ResultRecord};
use proto::{Executor, Promise};
use session::Core;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

/// Configures and starts a debug session.
pub struct SessionBuilder {
    id: SessionId,
    config: LaunchConfig,
    bus: EventBus,
}

impl SessionBuilder {
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            id: SessionId::new(),
            config,
            bus: EventBus::new(),
        }
    }

    /// Publish session events into a shared bus.
    pub fn with_bus(self, bus: EventBus) -> Self {
        Self { bus, ..self }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Spawn the session executor and run the initialization pipeline.
    ///
    /// Return a handle to the session and a pending result of the initialization.
    /// The handle is usable immediately, requests are served in the order they are made.
    pub fn start(self) -> Result<(SessionHandle, Pending<()>), Error> {
        let (executor, queue) = proto::task_queue::<Core>();
        let (promise, pending) = proto::promise();

        let Self { id, config, bus } = self;
        let core_executor = executor.clone();
        let core_bus = bus.clone();
        thread::Builder::new()
            .name(format!("mi-session-{id}"))
            .spawn(move || {
                let mut core = Core::new(id, config, core_executor, core_bus);
                core.start(promise);
                queue.run(&mut core);
                log::debug!(target: "session", "{id}: executor stopped");
            })?;

        let handle = SessionHandle {
            inner: Arc::new(Inner { id, executor, bus }),
        };
        Ok((handle, pending))
    }
}

struct Inner {
    id: SessionId,
    executor: Executor<Core>,
    bus: EventBus,
}

impl Drop for Inner {
    fn drop(&mut self) {
        log::debug!(target: "session", "{}: last handle dropped, close session", self.id);
        self.executor.post(|core: &mut Core| core.close());
    }
}

/// Cloneable handle to a running session. Dropping the last clone shuts the session down.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

impl SessionHandle {
    /// Post a request to the session executor. A request canceled before it runs
    /// is resolved with [`Error::Canceled`] without running.
    fn request<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Core, Promise<T>) + Send + 'static,
    {
        let (promise, pending) = proto::promise();
        // a rejected task drops the promise, the caller sees `SessionClosed`
        self.inner.executor.post(move |core: &mut Core| {
            if promise.is_canceled() {
                return promise.resolve(Err(Error::Canceled));
            }
            f(core, promise)
        });
        pending
    }

    /// Request answered right away from the session state.
    fn query<T, F>(&self, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Core) -> Result<T, Error> + Send + 'static,
    {
        self.request(move |core, promise| promise.resolve(f(core)))
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// Subscribe to events of this session.
    pub fn events(&self) -> Receiver<Event> {
        self.inner.bus.subscribe(self.inner.id)
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    // -------------------------------------- backend ------------------------------------------

    pub fn backend_state(&self) -> Pending<BackendState> {
        self.query(|core| Ok(core.backend.state()))
    }

    pub fn backend_pid(&self) -> Pending<Option<i32>> {
        self.query(|core| Ok(core.backend.pid()))
    }

    pub fn exit_code(&self) -> Pending<Option<i32>> {
        self.query(|core| Ok(core.backend.exit_code()))
    }

    /// Return `true` if the launch worker gave up because of the launch timeout.
    pub fn launch_interrupted(&self) -> Pending<bool> {
        self.query(|core| Ok(core.backend.launch_interrupted()))
    }

    /// Send SIGINT to the backend.
    pub fn interrupt(&self) -> Pending<()> {
        self.query(|core| core.backend.interrupt())
    }

    /// Terminate the backend process. Concurrent calls share one termination.
    pub fn terminate(&self) -> Pending<()> {
        self.request(|core, promise| {
            core.destroy(Box::new(move |_: &mut Core, result| promise.resolve(result)))
        })
    }

    /// Release initialized steps in reverse order. Failures of every step are collected.
    pub fn shutdown(&self) -> Pending<()> {
        self.request(|core, promise| {
            core.shutdown(Box::new(move |_: &mut Core, result| promise.resolve(result)))
        })
    }

    /// Send a raw command, bypassing caches.
    pub fn execute(&self, command: MiCommand) -> Pending<ResultRecord> {
        use cache::CommandControl;
        self.request(move |core, promise| {
            core.queue_command(
                command,
                Box::new(move |_: &mut Core, result| promise.resolve(result)),
            )
        })
    }

    // ------------------------------------- contexts ------------------------------------------

    pub fn control_context(&self) -> ControlContext {
        ControlContext::new(self.inner.id)
    }

    pub fn container_from_thread_id(&self, thread_id: impl Into<String>) -> Pending<ContainerContext> {
        let thread_id = thread_id.into();
        self.query(move |core| core.registry.container_from_thread_id(&thread_id))
    }

    pub fn containers(&self) -> Pending<Vec<ContainerContext>> {
        self.query(|core| Ok(core.registry.containers()))
    }

    pub fn processes(&self) -> Pending<Vec<ProcessContext>> {
        self.query(|core| Ok(core.registry.processes()))
    }

    pub fn process_data(&self, process: ProcessContext) -> Pending<ProcessData> {
        self.query(move |core| core.process_data(&process))
    }

    /// Execution contexts known from thread notifications, without a backend round trip.
    pub fn known_execution_contexts(&self, container: ContainerContext) -> Pending<Vec<ExecutionContext>> {
        self.query(move |core| {
            core.check_session(&Context::Container(container.clone()))?;
            Ok(core.registry.execution_contexts(&container))
        })
    }

    /// Enumerate threads of a container through the backend.
    pub fn execution_contexts(&self, container: ContainerContext) -> Pending<Vec<ExecutionContext>> {
        self.request(move |core, promise| core.execution_contexts(container, promise))
    }

    pub fn thread_data(&self, context: ExecutionContext) -> Pending<ThreadData> {
        self.request(move |core, promise| core.thread_data(context, promise))
    }

    /// Processes the backend may attach to.
    pub fn attachable_processes(&self) -> Pending<Vec<ProcessInfo>> {
        self.request(|core, promise| core.attachable_processes(promise))
    }

    // ------------------------------------ run control ----------------------------------------

    /// Execution state of a context, `None` if nothing is known about it yet.
    pub fn exec_state(&self, context: Context) -> Pending<Option<ExecState>> {
        self.query(move |core| core.exec_state(&context))
    }

    pub fn can_suspend(&self, context: Context) -> Pending<bool> {
        self.query(move |core| {
            core.check_session(&context)?;
            Ok(core.run_control.can_suspend(&context))
        })
    }

    pub fn can_resume(&self, context: Context) -> Pending<bool> {
        self.query(move |core| {
            core.check_session(&context)?;
            Ok(core.run_control.can_resume(&context))
        })
    }

    /// Interrupt a running context. Resolves when the interrupt is delivered,
    /// the stop itself is reported with [`Event::Suspended`].
    pub fn suspend(&self, context: Context) -> Pending<()> {
        self.query(move |core| core.suspend(&context))
    }

    pub fn resume(&self, context: Context) -> Pending<()> {
        self.request(move |core, promise| core.resume(context, promise))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn config(path: &str) -> LaunchConfig {
        LaunchConfig {
            debugger: DebuggerConfig {
                path: path.into(),
                launch_timeout_ms: 5_000,
                ..DebuggerConfig::default()
            },
            ..LaunchConfig::default()
        }
    }

    #[test]
    fn test_missing_debugger_is_launch_failure() {
        let (session, started) = SessionBuilder::new(config("/nonexistent/debugger"))
            .start()
            .unwrap();
        assert!(matches!(started.wait(), Err(Error::LaunchFailure(_))));
        assert_eq!(
            session.backend_state().wait().unwrap(),
            BackendState::NotInitialized
        );
        assert!(session.shutdown().wait().is_ok());
    }

    #[test]
    fn test_canceled_request_is_skipped() {
        let (session, started) = SessionBuilder::new(config("/nonexistent/debugger"))
            .start()
            .unwrap();
        _ = started.wait_timeout(Duration::from_secs(5));

        let (release, blocked) = mpsc::channel::<()>();
        let blocker = session.query(move |_| {
            _ = blocked.recv();
            Ok(())
        });
        let pending = session.containers();
        pending.cancel();
        release.send(()).unwrap();

        assert!(blocker.wait().is_ok());
        assert!(matches!(pending.wait(), Err(Error::Canceled)));
    }

    #[test]
    fn test_shared_bus_sees_session_events() {
        let bus = EventBus::new();
        let builder = SessionBuilder::new(config("/nonexistent/debugger")).with_bus(bus.clone());
        let events = bus.subscribe(builder.id());
        let (session, started) = builder.start().unwrap();
        assert!(started.wait().is_err());
        assert!(!bus.is_registered(session.id()));
        drop(session);
        // the executor closes the subscription once shutdown completes
        assert!(events.recv_timeout(Duration::from_secs(5)).is_err());
    }
}
