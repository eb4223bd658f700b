//! Addressable entities of a debug session model.
//!
//! Context identity is structural: two contexts are equal when they belong to the same
//! session, have equal ancestor chains and equal local ids.
use std::fmt::{Display, Formatter};
use strum_macros::{Display as StrumDisplay, IntoStaticStr};
use uuid::Uuid;

/// Identity of one debug session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a context can be asked for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    Process,
    Container,
    Thread,
    Execution,
    RunControl,
}

/// Root of the context hierarchy, one per session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ControlContext {
    session: SessionId,
}

impl ControlContext {
    pub(crate) fn new(session: SessionId) -> Self {
        Self { session }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

/// An operating system process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessContext {
    parent: ControlContext,
    id: String,
}

impl ProcessContext {
    /// Process id, or the unknown process sentinel.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &ControlContext {
        &self.parent
    }
}

/// A thread group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContainerContext {
    parent: ProcessContext,
    id: String,
}

impl ContainerContext {
    /// Group id assigned by the backend.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process(&self) -> &ProcessContext {
        &self.parent
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThreadContext {
    parent: ProcessContext,
    id: String,
}

impl ThreadContext {
    /// Thread handle assigned by the backend.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process(&self) -> &ProcessContext {
        &self.parent
    }
}

/// A thread running inside a thread group. Thread and container always share a process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    container: ContainerContext,
    thread: ThreadContext,
}

impl ExecutionContext {
    /// Same as the thread handle.
    pub fn id(&self) -> &str {
        self.thread.id()
    }

    pub fn container(&self) -> &ContainerContext {
        &self.container
    }

    pub fn thread(&self) -> &ThreadContext {
        &self.thread
    }
}

pub(crate) fn process(control: ControlContext, id: impl Into<String>) -> ProcessContext {
    ProcessContext {
        parent: control,
        id: id.into(),
    }
}

pub(crate) fn container(process: ProcessContext, id: impl Into<String>) -> ContainerContext {
    ContainerContext {
        parent: process,
        id: id.into(),
    }
}

pub(crate) fn thread(process: ProcessContext, id: impl Into<String>) -> ThreadContext {
    ThreadContext {
        parent: process,
        id: id.into(),
    }
}

/// Return `None` if thread and container belong to different processes.
pub(crate) fn execution(
    container: ContainerContext,
    thread: ThreadContext,
) -> Option<ExecutionContext> {
    (container.parent == thread.parent).then_some(ExecutionContext { container, thread })
}

/// Thread and container are known to be built from the same process.
pub(crate) fn execution_unchecked(
    container: ContainerContext,
    thread: ThreadContext,
) -> ExecutionContext {
    debug_assert_eq!(container.parent, thread.parent);
    ExecutionContext { container, thread }
}

/// Any addressable context.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    Control(ControlContext),
    Process(ProcessContext),
    Container(ContainerContext),
    Thread(ThreadContext),
    Execution(ExecutionContext),
}

impl Context {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Context::Control(_) => &[],
            Context::Process(_) => &[Capability::Process],
            Context::Container(_) => &[Capability::Container, Capability::RunControl],
            Context::Thread(_) => &[Capability::Thread],
            Context::Execution(_) => &[Capability::Execution, Capability::RunControl],
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn session(&self) -> SessionId {
        match self {
            Context::Control(c) => c.session,
            Context::Process(p) => p.parent.session,
            Context::Container(c) => c.parent.parent.session,
            Context::Thread(t) => t.parent.parent.session,
            Context::Execution(e) => e.container.parent.parent.session,
        }
    }

    /// Local id, empty for a control context.
    pub fn id(&self) -> &str {
        match self {
            Context::Control(_) => "",
            Context::Process(p) => p.id(),
            Context::Container(c) => c.id(),
            Context::Thread(t) => t.id(),
            Context::Execution(e) => e.id(),
        }
    }

    /// Direct parents. An execution context has two: its container and its thread.
    pub fn parents(&self) -> Vec<Context> {
        match self {
            Context::Control(_) => vec![],
            Context::Process(p) => vec![Context::Control(p.parent)],
            Context::Container(c) => vec![Context::Process(c.parent.clone())],
            Context::Thread(t) => vec![Context::Process(t.parent.clone())],
            Context::Execution(e) => vec![
                Context::Container(e.container.clone()),
                Context::Thread(e.thread.clone()),
            ],
        }
    }

    /// All ancestors, closest first, without duplicates.
    pub fn ancestors(&self) -> Vec<Context> {
        let mut ancestors: Vec<Context> = vec![];
        let mut queue = self.parents();
        while !queue.is_empty() {
            let next = queue.remove(0);
            if ancestors.contains(&next) {
                continue;
            }
            queue.extend(next.parents());
            ancestors.push(next);
        }
        ancestors
    }

    /// True if `other` is this context or one of its ancestors.
    pub fn is_within(&self, other: &Context) -> bool {
        self == other || self.ancestors().contains(other)
    }
}

impl From<ControlContext> for Context {
    fn from(c: ControlContext) -> Self {
        Context::Control(c)
    }
}

impl From<ProcessContext> for Context {
    fn from(p: ProcessContext) -> Self {
        Context::Process(p)
    }
}

impl From<ContainerContext> for Context {
    fn from(c: ContainerContext) -> Self {
        Context::Container(c)
    }
}

impl From<ThreadContext> for Context {
    fn from(t: ThreadContext) -> Self {
        Context::Thread(t)
    }
}

impl From<ExecutionContext> for Context {
    fn from(e: ExecutionContext) -> Self {
        Context::Execution(e)
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Context::Control(c) => write!(f, "session {}", c.session),
            Context::Process(p) => write!(f, "process {}", p.id),
            Context::Container(c) => write!(f, "thread group {}", c.id),
            Context::Thread(t) => write!(f, "thread {}", t.id),
            Context::Execution(e) => write!(f, "thread {} of group {}", e.id(), e.container.id),
        }
    }
}
