//! Mapping between backend assigned ids and session contexts.
//!
//! Tables are mutated only by the event dispatcher, everything else reads them.
use crate::control::context::{
    self, ContainerContext, ControlContext, ExecutionContext, ProcessContext, SessionId,
    ThreadContext,
};
use crate::control::error::Error;
use indexmap::IndexMap;

/// Group assumed for thread ids before any thread was announced.
pub const DEFAULT_GROUP_ID: &str = "i1";
/// Id of the synthetic execution context of a group without known threads.
pub const FALLBACK_THREAD_ID: &str = "1";
/// Process id of groups that were never announced.
pub const UNKNOWN_PROCESS_ID: &str = "<unknown>";
/// Thread id meaning "every thread".
pub const ALL_THREADS: &str = "all";

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessData {
    pub id: String,
    /// `None` until the process list is queried.
    pub name: Option<String>,
}

pub struct ContextRegistry {
    control: ControlContext,
    /// thread id -> group id
    thread_groups: IndexMap<String, String>,
    /// group id -> process id
    groups: IndexMap<String, String>,
    /// process id -> name, empty when not resolved yet
    names: IndexMap<String, String>,
}

impl ContextRegistry {
    pub fn new(session: SessionId) -> Self {
        Self {
            control: ControlContext::new(session),
            thread_groups: IndexMap::new(),
            groups: IndexMap::new(),
            names: IndexMap::new(),
        }
    }

    pub fn control_context(&self) -> ControlContext {
        self.control
    }

    pub fn create_process_context(&self, pid: impl Into<String>) -> ProcessContext {
        context::process(self.control, pid)
    }

    pub fn create_container_context(
        &self,
        process: ProcessContext,
        group_id: impl Into<String>,
    ) -> ContainerContext {
        context::container(process, group_id)
    }

    pub fn create_thread_context(
        &self,
        process: ProcessContext,
        thread_id: impl Into<String>,
    ) -> ThreadContext {
        context::thread(process, thread_id)
    }

    pub fn create_execution_context(
        &self,
        container: ContainerContext,
        thread: ThreadContext,
    ) -> Result<ExecutionContext, Error> {
        let msg = format!(
            "thread {} (process {}) is not a member of group {} (process {})",
            thread.id(),
            thread.process().id(),
            container.id(),
            container.process().id()
        );
        context::execution(container, thread).ok_or(Error::InvalidContext(msg))
    }

    /// Process of a thread group, the unknown process sentinel for unseen groups.
    pub fn process_of_group(&self, group_id: &str) -> ProcessContext {
        let pid = self
            .groups
            .get(group_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_PROCESS_ID);
        self.create_process_context(pid)
    }

    pub fn container(&self, group_id: &str) -> ContainerContext {
        self.create_container_context(self.process_of_group(group_id), group_id)
    }

    /// Execution context of a thread inside a group.
    pub fn execution_context(&self, group_id: &str, thread_id: &str) -> ExecutionContext {
        let container = self.container(group_id);
        let thread = self.create_thread_context(container.process().clone(), thread_id);
        context::execution_unchecked(container, thread)
    }

    /// Resolve thread group of a thread.
    ///
    /// Before any thread is known every id belongs to the default group. The wildcard id
    /// resolves to the first known group, with several debugged processes it is ambiguous.
    pub fn container_from_thread_id(&self, thread_id: &str) -> Result<ContainerContext, Error> {
        if thread_id == ALL_THREADS {
            let group_id = self
                .groups
                .keys()
                .chain(self.thread_groups.values())
                .next()
                .map(String::as_str)
                .unwrap_or(DEFAULT_GROUP_ID);
            return Ok(self.container(group_id));
        }

        if self.thread_groups.is_empty() {
            return Ok(self.container(DEFAULT_GROUP_ID));
        }

        self.thread_groups
            .get(thread_id)
            .map(|group_id| self.container(group_id))
            .ok_or_else(|| Error::InvalidContext(format!("unknown thread id `{thread_id}`")))
    }

    /// Execution contexts of every thread mapped to the group. A group without threads
    /// has exactly one synthetic context with the fallback id.
    pub fn execution_contexts(&self, container: &ContainerContext) -> Vec<ExecutionContext> {
        let mut contexts: Vec<_> = self
            .thread_ids(container.id())
            .map(|tid| self.execution_context_in(container, tid))
            .collect();
        if contexts.is_empty() {
            contexts.push(self.execution_context_in(container, FALLBACK_THREAD_ID));
        }
        contexts
    }

    fn execution_context_in(&self, container: &ContainerContext, thread_id: &str) -> ExecutionContext {
        let thread = self.create_thread_context(container.process().clone(), thread_id);
        context::execution_unchecked(container.clone(), thread)
    }

    /// Ids of threads mapped to the group, in creation order.
    pub fn thread_ids<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.thread_groups
            .iter()
            .filter(move |(_, gid)| *gid == group_id)
            .map(|(tid, _)| tid.as_str())
    }

    pub fn group_of_thread(&self, thread_id: &str) -> Option<&str> {
        self.thread_groups.get(thread_id).map(String::as_str)
    }

    pub fn is_known_group(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Known thread groups, in announcement order.
    pub fn containers(&self) -> Vec<ContainerContext> {
        self.groups.keys().map(|gid| self.container(gid)).collect()
    }

    /// Processes of known thread groups.
    pub fn processes(&self) -> Vec<ProcessContext> {
        let mut processes: Vec<ProcessContext> = vec![];
        for pid in self.groups.values() {
            let process = self.create_process_context(pid.as_str());
            if !processes.contains(&process) {
                processes.push(process);
            }
        }
        processes
    }

    pub fn process_data(&self, process: &ProcessContext) -> ProcessData {
        ProcessData {
            id: process.id().to_string(),
            name: self.process_name(process.id()).map(ToString::to_string),
        }
    }

    pub fn process_name(&self, pid: &str) -> Option<&str> {
        self.names
            .get(pid)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// True if a name cache entry exists, resolved or not.
    pub fn has_name_entry(&self, pid: &str) -> bool {
        self.names.contains_key(pid)
    }

    // ------------------------------- dispatcher side -------------------------------------

    pub(crate) fn thread_created(&mut self, thread_id: &str, group_id: &str) {
        self.thread_groups
            .insert(thread_id.to_string(), group_id.to_string());
    }

    /// Return the group the thread was mapped to.
    pub(crate) fn thread_exited(&mut self, thread_id: &str) -> Option<String> {
        self.thread_groups.shift_remove(thread_id)
    }

    /// Record a group and its process. Name of the process stays unresolved.
    pub(crate) fn group_created(&mut self, group_id: &str, pid: Option<&str>) -> ProcessContext {
        let pid = pid.unwrap_or(group_id).to_string();
        self.names.entry(pid.clone()).or_default();
        self.groups.insert(group_id.to_string(), pid.clone());
        self.create_process_context(pid)
    }

    pub(crate) fn set_process_name(&mut self, pid: &str, name: &str) {
        if let Some(entry) = self.names.get_mut(pid) {
            *entry = name.to_string();
        }
    }

    /// Forget a group, its threads and its process name. Return ids of purged threads.
    pub(crate) fn group_exited(&mut self, group_id: &str) -> Vec<String> {
        let threads = self.thread_ids(group_id).map(ToString::to_string).collect();
        self.thread_groups.retain(|_, gid| gid != group_id);
        let pid = self
            .groups
            .shift_remove(group_id)
            .unwrap_or_else(|| group_id.to_string());
        if !self.groups.values().any(|p| *p == pid) {
            self.names.shift_remove(&pid);
        }
        threads
    }
}
