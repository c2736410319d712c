//! Error mapping guide:
//! - Resource-absent is never an error: runtime queries return Ok(false)/Ok(None).
//! - RuntimeMissing maps to exit code 127, Cancelled to 130, everything else to 1.
//! - Engine errors keep the command's combined output; the CLI prints only `Display`.
use std::fmt;
use std::io;
use std::time::Duration;

/// Failure of a container-engine (or ssh) invocation.
#[derive(Debug)]
pub enum RuntimeError {
    /// The engine binary could not be located or was disabled.
    RuntimeMissing(String),
    /// The named object does not exist (only for mutating calls on a missing container).
    NotFound(String),
    /// Non-zero exit from the engine.
    Engine {
        command: String,
        status: Option<i32>,
        output: String,
    },
    Timeout {
        command: String,
        after: Duration,
    },
    Io(io::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::RuntimeMissing(msg) => write!(f, "{msg}"),
            RuntimeError::NotFound(name) => write!(f, "no such container: {name}"),
            RuntimeError::Engine {
                command, status, ..
            } => match status {
                Some(code) => write!(f, "`{command}` failed with exit status {code}"),
                None => write!(f, "`{command}` was terminated by a signal"),
            },
            RuntimeError::Timeout { command, after } => write!(
                f,
                "`{command}` timed out after {}",
                humantime::format_duration(*after)
            ),
            RuntimeError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RuntimeError {
    fn from(e: io::Error) -> Self {
        RuntimeError::Io(e)
    }
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Failure of `ensure_ready` and the commands built on top of it.
#[derive(Debug)]
pub enum ReconcileError {
    /// A decision point was declined or dismissed.
    Cancelled(String),
    /// Another reconciliation for the same workspace holds the session lock.
    Busy(String),
    Runtime(RuntimeError),
    Config(String),
    Io(io::Error),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Cancelled(what) => write!(f, "cancelled: {what}"),
            ReconcileError::Busy(slug) => write!(
                f,
                "another operation for workspace '{slug}' is in progress (lock held). Please try again later."
            ),
            ReconcileError::Runtime(e) => write!(f, "{e}"),
            ReconcileError::Config(msg) => write!(f, "{msg}"),
            ReconcileError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Runtime(e) => Some(e),
            ReconcileError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RuntimeError> for ReconcileError {
    fn from(e: RuntimeError) -> Self {
        ReconcileError::Runtime(e)
    }
}

impl From<io::Error> for ReconcileError {
    fn from(e: io::Error) -> Self {
        ReconcileError::Io(e)
    }
}

impl ReconcileError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled(_))
    }

    /// Captured engine output, when the failure came from an engine command.
    pub fn engine_output(&self) -> Option<&str> {
        match self {
            ReconcileError::Runtime(RuntimeError::Engine { output, .. }) => Some(output.as_str()),
            _ => None,
        }
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

pub fn exit_code_for_runtime_error(e: &RuntimeError) -> u8 {
    match e {
        RuntimeError::RuntimeMissing(_) => 127,
        RuntimeError::Io(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}

pub fn exit_code_for_reconcile_error(e: &ReconcileError) -> u8 {
    match e {
        ReconcileError::Cancelled(_) => 130,
        ReconcileError::Runtime(re) => exit_code_for_runtime_error(re),
        ReconcileError::Io(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code_for_reconcile_error(&ReconcileError::Cancelled("rebuild".into())),
            130
        );
        assert_eq!(
            exit_code_for_reconcile_error(&ReconcileError::Runtime(RuntimeError::RuntimeMissing(
                "docker".into()
            ))),
            127
        );
        let engine = RuntimeError::Engine {
            command: "docker build".into(),
            status: Some(1),
            output: "boom".into(),
        };
        let err = ReconcileError::from(engine);
        assert_eq!(exit_code_for_reconcile_error(&err), 1);
        assert_eq!(err.engine_output(), Some("boom"));
    }

    #[test]
    fn test_engine_display_is_single_line() {
        let e = RuntimeError::Engine {
            command: "docker run".into(),
            status: Some(125),
            output: "line1\nline2".into(),
        };
        let s = e.to_string();
        assert!(!s.contains('\n'), "{s}");
        assert!(s.contains("125"));
    }
}
