//! Machine interface (MI) wire records.
//!
//! Every line produced by the backend is one of: a result record (reply to a command,
//! correlated by token), an async record (exec/status/notify notification, no correlation),
//! a stream record (console, target or log text) or the prompt marker.

pub mod command;
mod parser;

pub use command::MiCommand;

use std::fmt::{Display, Formatter};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Correlation token, chosen by the command issuer.
pub type Token = u64;

/// The prompt line terminating every reply batch.
pub const PROMPT: &str = "(gdb)";

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*` - execution state changes.
    Exec,
    /// `+` - progress of slow operations.
    Status,
    /// `=` - supplementary information (thread and thread-group lifecycle, libraries, etc).
    Notify,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// `~` - console output.
    Console,
    /// `@` - output of the running target.
    Target,
    /// `&` - debugger internal log.
    Log,
}

/// Value of a `variable=value` pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Const(String),
    Tuple(Results),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Const(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Results> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }
}

/// Ordered list of `variable=value` pairs. Keys may repeat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Results(pub Vec<(String, Value)>);

impl Results {
    /// Return the first value with given key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Return the first value with given key if it is a string constant.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Return the first value with given key if it is a list.
    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    pub token: Option<Token>,
    pub class: ResultClass,
    pub results: Results,
}

impl ResultRecord {
    /// Error message of an `^error` record.
    pub fn error_message(&self) -> Option<&str> {
        (self.class == ResultClass::Error).then(|| self.results.get_str("msg").unwrap_or(""))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AsyncRecord {
    pub token: Option<Token>,
    pub kind: AsyncKind,
    pub class: String,
    pub results: Results,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamKind, String),
    Prompt,
}

impl Record {
    /// Parse a single output line. Trailing line terminators are ignored.
    pub fn parse(line: &str) -> anyhow::Result<Record> {
        parser::parse_record(line.trim_end_matches(['\r', '\n']))
    }

    /// Like [`Record::parse`], but lines that are not valid records are treated as
    /// target output. Debuggers interleave raw inferior output with MI records.
    pub fn parse_lossy(line: &str) -> Record {
        match Self::parse(line) {
            Ok(record) => record,
            Err(e) => {
                log::debug!(target: "dispatch", "not a protocol record ({e:#}): {line:?}");
                Record::Stream(
                    StreamKind::Target,
                    line.trim_end_matches(['\r', '\n']).to_string(),
                )
            }
        }
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, Record::Prompt)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(s) => write!(f, "{}", command::quote(s)),
            Value::Tuple(t) => write!(f, "{{{t}}}"),
            Value::List(l) => {
                f.write_str("[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl Display for Results {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
