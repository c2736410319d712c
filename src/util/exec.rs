use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use wait_timeout::ChildExt;

use crate::diagnostics::DiagnosticSink;
use crate::util::shell_join;

/// Structured command execution with timeouts and line streaming to a diagnostic sink.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Run to completion. Output is captured; when `request.label` is set every line is
    /// also forwarded to `sink` while the process runs.
    pub fn run(&self, request: ExecRequest, sink: &dyn DiagnosticSink) -> Result<ExecOutcome> {
        let mut cmd = Command::new(&request.program);
        for arg in &request.args {
            cmd.arg(arg);
        }
        if let Some(ref cwd) = request.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if request.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        sink.command(&request.display());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let label = request.label.as_deref().map(|l| (l, request.quiet));
        let started = Instant::now();

        let stdout_buf = Mutex::new(String::new());
        let stderr_buf = Mutex::new(String::new());
        let combined = Mutex::new(String::new());

        let waited: Result<Option<ExitStatus>> = std::thread::scope(|scope| {
            if let (Some(mut pipe), Some(data)) = (stdin_pipe, request.stdin.as_deref()) {
                scope.spawn(move || {
                    let _ = pipe.write_all(data);
                });
            }
            if let Some(pipe) = stdout_pipe {
                let (buf, all) = (&stdout_buf, &combined);
                scope.spawn(move || pump_lines(pipe, buf, all, label, sink));
            }
            if let Some(pipe) = stderr_pipe {
                let (buf, all) = (&stderr_buf, &combined);
                scope.spawn(move || pump_lines(pipe, buf, all, label, sink));
            }

            if timeout.is_zero() {
                return child.wait().map(Some).context("failed to wait for process");
            }
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => Ok(Some(status)),
                None => {
                    // Killing closes the pipes, which lets the readers finish.
                    let _ = child.kill();
                    let _ = child.wait();
                    Ok(None)
                }
            }
        });

        let duration = started.elapsed();
        let status = waited?;
        Ok(ExecOutcome {
            status,
            duration,
            timeout,
            stdout: stdout_buf.into_inner().unwrap_or_default(),
            stderr: stderr_buf.into_inner().unwrap_or_default(),
            combined: combined.into_inner().unwrap_or_default(),
        })
    }
}

fn pump_lines(
    pipe: impl Read,
    own: &Mutex<String>,
    combined: &Mutex<String>,
    label: Option<(&str, bool)>,
    sink: &dyn DiagnosticSink,
) {
    let reader = BufReader::new(pipe);
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => continue,
            Err(_) => break,
        };
        match label {
            Some((label, true)) => sink.detail(label, &line),
            Some((label, false)) => sink.output(label, &line),
            None => {}
        }
        if let Ok(mut g) = own.lock() {
            g.push_str(&line);
            g.push('\n');
        }
        if let Ok(mut g) = combined.lock() {
            g.push_str(&line);
            g.push('\n');
        }
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
    label: Option<String>,
    quiet: bool,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stream output lines to the sink under this label.
    pub fn stream_as(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self.quiet = false;
        self
    }

    /// Like `stream_as`, but lines go to `DiagnosticSink::detail`.
    pub fn stream_quiet(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self.quiet = true;
        self
    }

    /// Shell-joined command line for echoes and error messages (program basename first).
    pub fn display(&self) -> String {
        let prog = PathBuf::from(&self.program)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());
        let mut words = vec![prog];
        words.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        shell_join(&words)
    }
}

#[derive(Debug)]
pub struct ExecOutcome {
    /// `None` when the process was killed after `timeout`.
    pub status: Option<ExitStatus>,
    pub duration: Duration,
    pub timeout: Duration,
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}
