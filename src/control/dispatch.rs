//! Consumer of backend output records. Runs on the session executor, one record at a
//! time in arrival order, and is the only writer of the context registry.
use crate::control::context::{ContainerContext, Context};
use crate::control::event::Event;
use crate::control::registry::ALL_THREADS;
use crate::control::run_control::{ExecState, StopReason};
use crate::control::session::Core;
use crate::mi::{AsyncKind, AsyncRecord, Record, Results, StreamKind, Value};
use std::str::FromStr;

impl Core {
    pub(crate) fn dispatch(&mut self, record: Record) {
        match record {
            Record::Result(result) => {
                let Some(conn) = self.connection.as_mut() else {
                    log::debug!(target: "dispatch", "reply after backend exit dropped: {result:?}");
                    return;
                };
                if let Some((reply, result)) = conn.complete(result) {
                    reply(self, result);
                }
            }
            Record::Async(record) => match record.kind {
                AsyncKind::Notify => self.on_notify(record),
                AsyncKind::Exec => self.on_exec(record),
                AsyncKind::Status => {
                    log::debug!(target: "dispatch", "status: {} {}", record.class, record.results)
                }
            },
            Record::Stream(kind, text) => {
                match kind {
                    StreamKind::Log => log::debug!(target: "dispatch", "backend log: {}", text.trim_end()),
                    _ => log::trace!(target: "dispatch", "{kind:?}: {}", text.trim_end()),
                }
                self.publish(Event::Output(kind, text));
            }
            Record::Prompt => {}
        }
    }

    fn on_notify(&mut self, record: AsyncRecord) {
        let results = &record.results;
        match record.class.as_str() {
            "thread-created" => {
                let (Some(tid), Some(gid)) = (results.get_str("id"), results.get_str("group-id"))
                else {
                    return malformed(&record);
                };
                self.on_thread_created(tid, gid)
            }
            "thread-exited" => {
                let Some(tid) = results.get_str("id") else {
                    return malformed(&record);
                };
                self.on_thread_exited(tid, results.get_str("group-id"))
            }
            "thread-group-created" | "thread-group-started" => {
                let Some(gid) = results.get_str("id") else {
                    return malformed(&record);
                };
                self.on_group_created(gid, results.get_str("pid"))
            }
            "thread-group-exited" => {
                let Some(gid) = results.get_str("id") else {
                    return malformed(&record);
                };
                if let Some(code) = results.get_str("exit-code") {
                    log::debug!(target: "dispatch", "thread group {gid} exit code {code}");
                }
                self.on_group_exited(gid)
            }
            "thread-group-added" => {
                log::debug!(target: "dispatch", "thread group added: {}", results)
            }
            class => log::debug!(target: "dispatch", "notification `{class}` ignored"),
        }
    }

    fn on_thread_created(&mut self, tid: &str, gid: &str) {
        self.registry.thread_created(tid, gid);
        self.run_control.thread_started(tid);

        let ctx = self.registry.execution_context(gid, tid);
        self.container_cache
            .reset_context(&Context::Container(ctx.container().clone()));
        self.thread_cache.reset_context(&Context::Execution(ctx.clone()));
        self.publish(Event::ThreadStarted(ctx));
    }

    fn on_thread_exited(&mut self, tid: &str, gid: Option<&str>) {
        let known_group = self.registry.thread_exited(tid);
        let Some(gid) = gid.map(ToString::to_string).or(known_group) else {
            log::warn!(target: "dispatch", "exit of thread {tid} without group");
            self.run_control.thread_exited(tid);
            return;
        };
        self.run_control.thread_exited(tid);

        let ctx = self.registry.execution_context(&gid, tid);
        self.thread_cache.reset_context(&Context::Execution(ctx.clone()));
        self.container_cache
            .reset_context(&Context::Container(ctx.container().clone()));
        self.publish(Event::ThreadExited(ctx));
    }

    fn on_group_created(&mut self, gid: &str, pid: Option<&str>) {
        let process = self.registry.group_created(gid, pid);
        self.run_control.group_started(gid);
        self.resolve_process_name(process.id().to_string());

        self.container_cache.reset();
        self.publish(Event::ContainerStarted(self.registry.container(gid)));
    }

    fn on_group_exited(&mut self, gid: &str) {
        let container = self.registry.container(gid);
        let threads = self.registry.group_exited(gid);
        self.run_control.group_exited(gid, &threads);

        let ctx = Context::Container(container.clone());
        self.container_cache.reset_context(&ctx);
        self.thread_cache.reset_context(&ctx);
        self.container_cache.set_context_available(ctx.clone(), true);
        self.thread_cache.set_context_available(ctx, true);
        self.publish(Event::ContainerExited(container));
    }

    fn on_exec(&mut self, record: AsyncRecord) {
        match record.class.as_str() {
            "stopped" => {
                let reason = record
                    .results
                    .get_str("reason")
                    .map(|r| StopReason::from_str(r).unwrap_or_default())
                    .unwrap_or_default();
                self.on_stopped(&record.results, reason)
            }
            "running" => self.on_running(&record.results),
            class => log::debug!(target: "dispatch", "exec notification `{class}` ignored"),
        }
    }

    /// Ids of affected threads, `None` means all threads.
    fn affected_threads(results: &Results, key: &str) -> Option<Vec<String>> {
        match results.get(key) {
            Some(Value::Const(id)) if id == ALL_THREADS => None,
            Some(Value::Const(id)) => Some(vec![id.clone()]),
            Some(Value::List(ids)) => Some(
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Containers affected by an all-threads notification.
    fn all_containers(&self) -> Vec<ContainerContext> {
        let containers = self.registry.containers();
        if !containers.is_empty() {
            return containers;
        }
        self.registry
            .container_from_thread_id(ALL_THREADS)
            .map(|c| vec![c])
            .unwrap_or_default()
    }

    /// Contexts affected by a run control notification.
    fn run_control_targets(&self, threads: Option<Vec<String>>) -> Vec<(Context, Option<String>)> {
        match threads {
            None => self
                .all_containers()
                .into_iter()
                .map(|c| (Context::Container(c), None))
                .collect(),
            Some(ids) => ids
                .into_iter()
                .filter_map(|tid| {
                    let container = crate::weak_error!(
                        self.registry.container_from_thread_id(&tid),
                        "run control notification:"
                    )?;
                    let ctx = self.registry.execution_context(container.id(), &tid);
                    Some((Context::Execution(ctx), Some(tid)))
                })
                .collect(),
        }
    }

    fn on_stopped(&mut self, results: &Results, reason: StopReason) {
        // a stop without stopped-threads comes from all-stop mode
        let threads = match results.get("stopped-threads") {
            Some(_) => Self::affected_threads(results, "stopped-threads"),
            None => None,
        };
        let state = ExecState::Suspended(reason.clone());
        if threads.is_none() {
            self.run_control.set_all_states(state.clone());
        }

        for (ctx, tid) in self.run_control_targets(threads) {
            if let Some(tid) = &tid {
                let gid = self.registry.group_of_thread(tid).map(ToString::to_string);
                self.run_control
                    .set_thread_state(tid, gid.as_deref(), state.clone());
            }
            self.container_cache.set_context_available(ctx.clone(), true);
            self.thread_cache.set_context_available(ctx.clone(), true);
            self.publish(Event::Suspended {
                context: ctx,
                reason: reason.clone(),
            });
        }
    }

    fn on_running(&mut self, results: &Results) {
        let threads = Self::affected_threads(results, "thread-id");
        if threads.is_none() {
            self.run_control.set_all_states(ExecState::Running);
        }

        for (ctx, tid) in self.run_control_targets(threads) {
            if let Some(tid) = &tid {
                let gid = self.registry.group_of_thread(tid).map(ToString::to_string);
                self.run_control
                    .set_thread_state(tid, gid.as_deref(), ExecState::Running);
            }
            self.container_cache.set_context_available(ctx.clone(), false);
            self.thread_cache.set_context_available(ctx.clone(), false);
            self.publish(Event::Resumed { context: ctx });
        }
    }
}

fn malformed(record: &AsyncRecord) {
    log::warn!(target: "dispatch", "malformed `{}` notification: {}", record.class, record.results);
}
