use crate::mi::Token;
use itertools::Itertools;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// A machine interface command: `-operation [--thread id] [--thread-group id] options params`.
///
/// The textual form without a token is the command *signature*, two commands with equal
/// signatures are interchangeable and their replies may be shared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MiCommand {
    operation: Cow<'static, str>,
    thread: Option<String>,
    thread_group: Option<String>,
    options: Vec<String>,
    params: Vec<String>,
}

impl MiCommand {
    pub fn new(operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            operation: operation.into(),
            thread: None,
            thread_group: None,
            options: vec![],
            params: vec![],
        }
    }

    /// Bind command to a thread (`--thread`).
    pub fn thread(self, thread_id: impl Into<String>) -> Self {
        Self {
            thread: Some(thread_id.into()),
            ..self
        }
    }

    /// Bind command to a thread group (`--thread-group`).
    pub fn thread_group(self, group_id: impl Into<String>) -> Self {
        Self {
            thread_group: Some(group_id.into()),
            ..self
        }
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params<I: IntoIterator<Item = S>, S: Into<String>>(mut self, params: I) -> Self {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Command text without a token.
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Wire form of command correlated by `token`, without a line terminator.
    pub fn to_line(&self, token: Token) -> String {
        format!("{token}{}", self)
    }

    // ------------------------------ well known commands -----------------------------------

    /// List all thread groups (inferiors) known to the debugger.
    pub fn list_thread_groups() -> Self {
        Self::new("-list-thread-groups")
    }

    /// List threads of a single thread group.
    pub fn list_threads_of_group(group_id: impl Into<String>) -> Self {
        Self::new("-list-thread-groups").param(group_id)
    }

    /// List all processes the debugger may attach to.
    pub fn list_available_processes() -> Self {
        Self::new("-list-thread-groups").option("--available")
    }

    pub fn thread_info(thread_id: impl Into<String>) -> Self {
        Self::new("-thread-info").param(thread_id)
    }

    pub fn exec_continue() -> Self {
        Self::new("-exec-continue")
    }

    pub fn exec_interrupt() -> Self {
        Self::new("-exec-interrupt")
    }

    pub fn environment_cd(dir: impl Into<String>) -> Self {
        Self::new("-environment-cd").param(dir)
    }

    pub fn gdb_set(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new("-gdb-set").param(variable).param(value)
    }

    pub fn file_exec_and_symbols(program: impl Into<String>) -> Self {
        Self::new("-file-exec-and-symbols").param(program)
    }

    pub fn exec_arguments<I: IntoIterator<Item = S>, S: Into<String>>(args: I) -> Self {
        Self::new("-exec-arguments").params(args)
    }

    pub fn gdb_exit() -> Self {
        Self::new("-gdb-exit")
    }
}

/// Quote parameter if it contains characters that break MI tokenization.
pub(crate) fn quote(param: &str) -> Cow<'_, str> {
    let needs_quotes = param.is_empty()
        || param
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        return Cow::Borrowed(param);
    }

    let mut quoted = String::with_capacity(param.len() + 2);
    quoted.push('"');
    for c in param.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

impl Display for MiCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.operation)?;
        if let Some(thread) = &self.thread {
            write!(f, " --thread {}", quote(thread))?;
        }
        if let Some(group) = &self.thread_group {
            write!(f, " --thread-group {}", quote(group))?;
        }
        if !self.options.is_empty() {
            write!(f, " {}", self.options.iter().map(|o| quote(o)).join(" "))?;
        }
        if !self.params.is_empty() {
            write!(f, " {}", self.params.iter().map(|p| quote(p)).join(" "))?;
        }
        Ok(())
    }
}
