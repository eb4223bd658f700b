//! Command channel to the backend: token allocation, command writing and routing of
//! result records back to the pending request with the same token.
use crate::control::cache::Reply;
use crate::control::error::Error;
use crate::mi::{MiCommand, ResultClass, ResultRecord, Token};
use indexmap::IndexMap;
use std::io::Write;

struct PendingCommand<C> {
    command: MiCommand,
    reply: Reply<C>,
}

pub(crate) struct Connection<C> {
    writer: Box<dyn Write + Send>,
    next_token: Token,
    pending: IndexMap<Token, PendingCommand<C>>,
}

impl<C> Connection<C> {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            next_token: 1,
            pending: IndexMap::new(),
        }
    }

    /// Write a command. On failure the reply is given back to the caller.
    pub fn send(&mut self, command: MiCommand, reply: Reply<C>) -> Result<Token, (Error, Reply<C>)> {
        let token = self.next_token;
        self.next_token += 1;

        let line = command.to_line(token);
        log::debug!(target: "session", "-> {line}");
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush()) {
            return Err((Error::from(e), reply));
        }

        self.pending.insert(token, PendingCommand { command, reply });
        Ok(token)
    }

    /// Write a command, the reply is ignored.
    pub fn send_detached(&mut self, command: MiCommand) -> Result<Token, Error> {
        self.send(command, Box::new(|_, _| {})).map_err(|(e, _)| e)
    }

    /// Take the pending request of a result record, and the result it resolves with.
    /// `^error` records turn into protocol errors.
    pub fn complete(&mut self, record: ResultRecord) -> Option<(Reply<C>, Result<ResultRecord, Error>)> {
        let Some(token) = record.token else {
            log::warn!(target: "dispatch", "result record without token dropped: {record:?}");
            return None;
        };
        let Some(pending) = self.pending.shift_remove(&token) else {
            log::warn!(target: "dispatch", "result record with unknown token {token} dropped");
            return None;
        };

        let result = match record.class {
            ResultClass::Error => Err(Error::Protocol {
                command: pending.command.signature(),
                message: record.error_message().unwrap_or_default().to_string(),
                code: record.results.get_str("code").map(ToString::to_string),
            }),
            _ => Ok(record),
        };
        Some((pending.reply, result))
    }

    /// Drain every pending request, oldest first.
    pub fn take_pending(&mut self) -> Vec<Reply<C>> {
        self.pending.drain(..).map(|(_, p)| p.reply).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
