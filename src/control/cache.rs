//! Memoization of idempotent backend queries.
//!
//! Entries live until an event resets them, there is no expiration by time. Error replies
//! are never stored.
use crate::control::context::Context;
use crate::control::error::Error;
use crate::mi::{MiCommand, ResultRecord};
use std::collections::HashMap;

/// Continuation of a command, runs on the session executor.
pub(crate) type Reply<C> = Box<dyn FnOnce(&mut C, Result<ResultRecord, Error>)>;

/// Something able to send commands to the backend.
pub(crate) trait CommandControl: Sized + 'static {
    fn queue_command(&mut self, command: MiCommand, reply: Reply<Self>);
}

/// Accessor of a cache inside its owner.
pub(crate) type Select<C> = fn(&mut C) -> &mut CommandCache<C>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct Key {
    context: Context,
    signature: String,
}

enum Entry {
    Done(ResultRecord),
    InFlight(u64),
}

struct InFlight<C> {
    key: Key,
    waiters: Vec<Reply<C>>,
    /// Reset while in flight, reply is delivered but not stored.
    stale: bool,
}

pub(crate) struct CommandCache<C> {
    name: &'static str,
    /// Drop entry as soon as the request completes, only in-flight requests are shared.
    always_reset: bool,
    entries: HashMap<Key, Entry>,
    in_flight: HashMap<u64, InFlight<C>>,
    next_request: u64,
    /// Explicit availability marks, the closest marked ancestor decides for a context.
    availability: HashMap<Context, bool>,
}

impl<C: CommandControl> CommandCache<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            always_reset: false,
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            next_request: 0,
            availability: HashMap::new(),
        }
    }

    pub fn always_reset(name: &'static str) -> Self {
        Self {
            always_reset: true,
            ..Self::new(name)
        }
    }

    /// Availability of a context is its own mark, or the mark of the closest marked
    /// ancestor. Unmarked contexts are available.
    pub fn is_available(&self, context: &Context) -> bool {
        if self.availability.is_empty() {
            return true;
        }
        std::iter::once(context.clone())
            .chain(context.ancestors())
            .find_map(|ctx| self.availability.get(&ctx).copied())
            .unwrap_or(true)
    }

    /// Mark a context and all its descendants. A context made available inside an
    /// unavailable ancestor keeps its own mark, siblings stay unavailable.
    pub fn set_context_available(&mut self, context: Context, available: bool) {
        self.availability.retain(|ctx, _| !ctx.is_within(&context));
        if !available || !self.is_available(&context) {
            self.availability.insert(context, available);
        }
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.reset_where(|_| true)
    }

    /// Drop entries of a context and its descendants.
    pub fn reset_context(&mut self, context: &Context) {
        self.reset_where(|key| key.context.is_within(context))
    }

    fn reset_where(&mut self, predicate: impl Fn(&Key) -> bool) {
        let in_flight = &mut self.in_flight;
        self.entries.retain(|key, entry| {
            if !predicate(key) {
                return true;
            }
            if let Entry::InFlight(request) = entry {
                if let Some(req) = in_flight.get_mut(request) {
                    req.stale = true;
                }
            }
            false
        });
    }

    /// Number of stored replies.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Done(_)))
            .count()
    }

    /// Serve command from the cache or send it to the backend.
    ///
    /// A stored reply is served when the context is available. A request with the same
    /// signature already in flight is joined. Otherwise the command is issued.
    pub fn execute(
        owner: &mut C,
        select: Select<C>,
        context: Context,
        command: MiCommand,
        reply: Reply<C>,
    ) {
        let cache = select(owner);
        if !cache.is_available(&context) {
            log::trace!(target: "cache", "{}: {context} unavailable, send `{command}`", cache.name);
            owner.queue_command(command, reply);
            return;
        }

        let key = Key {
            context,
            signature: command.signature(),
        };
        match cache.entries.get(&key) {
            Some(Entry::Done(record)) => {
                log::trace!(target: "cache", "{}: hit `{}`", cache.name, key.signature);
                let record = record.clone();
                reply(owner, Ok(record));
                return;
            }
            Some(Entry::InFlight(request)) => {
                if let Some(req) = cache.in_flight.get_mut(request) {
                    req.waiters.push(reply);
                    return;
                }
            }
            None => {}
        }

        let request = cache.next_request;
        cache.next_request += 1;
        cache.entries.insert(key.clone(), Entry::InFlight(request));
        cache.in_flight.insert(
            request,
            InFlight {
                key,
                waiters: vec![reply],
                stale: false,
            },
        );

        owner.queue_command(
            command,
            Box::new(move |owner: &mut C, result| Self::complete(owner, select, request, result)),
        );
    }

    fn complete(owner: &mut C, select: Select<C>, request: u64, result: Result<ResultRecord, Error>) {
        let cache = select(owner);
        let Some(req) = cache.in_flight.remove(&request) else {
            return;
        };

        if !req.stale {
            match (&result, cache.always_reset) {
                (Ok(record), false) => {
                    cache.entries.insert(req.key, Entry::Done(record.clone()));
                }
                _ => {
                    cache.entries.remove(&req.key);
                }
            }
        }

        for waiter in req.waiters {
            waiter(owner, result.clone());
        }
    }
}
