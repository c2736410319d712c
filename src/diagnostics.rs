#![allow(clippy::module_name_repetitions)]
//! Diagnostic output channel for engine and ssh invocations.
//!
//! Every external command streams its combined stdout/stderr here line by line so an
//! operator can trace failures; callers only surface a one-line summary themselves.

use std::sync::Mutex;

use crate::color::{color_enabled_stderr, paint};

/// Sink for command echo lines and streamed command output.
pub trait DiagnosticSink: Send + Sync {
    /// A command is about to run (`argv` already shell-joined).
    fn command(&self, line: &str);
    /// One line of combined output from the running command.
    fn output(&self, label: &str, line: &str);
    /// Output of a routine query (inspect, port lookup, probes); quieter than `output`.
    fn detail(&self, label: &str, line: &str) {
        self.output(label, line);
    }
    /// A free-form note from the host tool itself.
    fn note(&self, line: &str);
}

/// Stderr-backed sink used by the CLI.
#[derive(Debug, Clone)]
pub struct StderrSink {
    verbose: bool,
    use_color: bool,
}

impl StderrSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            use_color: color_enabled_stderr(),
        }
    }
}

impl DiagnosticSink for StderrSink {
    fn command(&self, line: &str) {
        if self.verbose {
            eprintln!(
                "{}",
                paint(self.use_color, "\x1b[90m", &format!("codium-devcontainer: {line}"))
            );
        }
    }

    fn output(&self, label: &str, line: &str) {
        eprintln!("{}", paint(self.use_color, "\x1b[90m", &format!("[{label}] {line}")));
    }

    fn detail(&self, label: &str, line: &str) {
        if self.verbose {
            self.output(label, line);
        }
    }

    fn note(&self, line: &str) {
        eprintln!(
            "{}",
            paint(self.use_color, "\x1b[36m", &format!("codium-devcontainer: {line}"))
        );
    }
}

/// In-memory sink; records every line in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, line: String) {
        if let Ok(mut g) = self.lines.lock() {
            g.push(line);
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn command(&self, line: &str) {
        self.push(format!("$ {line}"));
    }

    fn output(&self, label: &str, line: &str) {
        self.push(format!("[{label}] {line}"));
    }

    fn note(&self, line: &str) {
        self.push(line.to_string());
    }
}
