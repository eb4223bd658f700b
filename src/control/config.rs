//! Launch configuration of a debug session.
use crate::control::error::Error;
use crate::mi::MiCommand;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Flags passed to the debugger on every launch: machine interface, no init files, quiet.
pub const DEBUGGER_FLAGS: [&str; 3] = ["--interpreter=mi2", "--nx", "-q"];

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Debugger executable, looked up in `PATH` if not an existing file.
    pub path: PathBuf,
    pub launch_timeout_ms: u64,
    pub terminate_retries: u32,
    pub terminate_backoff_ms: u64,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gdb"),
            launch_timeout_ms: 30_000,
            terminate_retries: 10,
            terminate_backoff_ms: 100,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgramConfig {
    /// Program to debug, nothing is loaded if not set.
    pub path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub arguments: Vec<String>,
    pub solib_search_path: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub debugger: DebuggerConfig,
    pub program: ProgramConfig,
}

fn parse_attr<T: FromStr>(key: &str, value: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{key}: {e}")))
}

impl LaunchConfig {
    /// Build configuration from a flat key/value source (as front-ends store launch
    /// attributes). Missing keys keep their defaults, unknown keys are ignored.
    pub fn from_attributes<I, K, V>(attributes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in attributes {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "debugger.path" => config.debugger.path = PathBuf::from(value),
                "debugger.launch_timeout_ms" => {
                    config.debugger.launch_timeout_ms = parse_attr(key, value)?
                }
                "debugger.terminate_retries" => {
                    config.debugger.terminate_retries = parse_attr(key, value)?
                }
                "debugger.terminate_backoff_ms" => {
                    config.debugger.terminate_backoff_ms = parse_attr(key, value)?
                }
                "program.path" => config.program.path = Some(PathBuf::from(value)),
                "program.working_dir" => config.program.working_dir = Some(PathBuf::from(value)),
                "program.arguments" => {
                    config.program.arguments =
                        value.split_whitespace().map(ToString::to_string).collect()
                }
                "program.solib_search_path" => {
                    config.program.solib_search_path = std::env::split_paths(value)
                        .filter(|p| !p.as_os_str().is_empty())
                        .collect()
                }
                _ => log::debug!(target: "session", "unknown launch attribute `{key}` ignored"),
            }
        }
        Ok(config)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.debugger.launch_timeout_ms)
    }

    pub fn terminate_backoff(&self) -> Duration {
        Duration::from_millis(self.debugger.terminate_backoff_ms)
    }

    /// Resolve the debugger executable.
    pub fn debugger_program(&self) -> Result<PathBuf, Error> {
        let path = &self.debugger.path;
        if Path::new(path).is_file() {
            return Ok(path.clone());
        }
        which::which(path).map_err(|e| Error::LaunchFailure(format!("{}: {e}", path.display())))
    }

    /// Full command line of the backend, program first.
    pub fn command_line(&self) -> Result<Vec<OsString>, Error> {
        let mut line = vec![self.debugger_program()?.into_os_string()];
        line.extend(DEBUGGER_FLAGS.iter().map(OsString::from));
        Ok(line)
    }

    /// Commands preparing the inferior, in issue order. Only configured settings produce
    /// a command.
    pub fn inferior_setup_commands(&self) -> Result<Vec<MiCommand>, Error> {
        let program = &self.program;
        let mut commands = vec![];
        if let Some(dir) = &program.working_dir {
            commands.push(MiCommand::environment_cd(dir.to_string_lossy()));
        }
        if !program.solib_search_path.is_empty() {
            let paths = std::env::join_paths(&program.solib_search_path)
                .map_err(|e| Error::InvalidConfig(format!("program.solib_search_path: {e}")))?;
            commands.push(MiCommand::gdb_set(
                "solib-search-path",
                paths.to_string_lossy(),
            ));
        }
        if let Some(path) = &program.path {
            commands.push(MiCommand::file_exec_and_symbols(path.to_string_lossy()));
        }
        if !program.arguments.is_empty() {
            commands.push(MiCommand::exec_arguments(program.arguments.iter().cloned()));
        }
        Ok(commands)
    }
}
