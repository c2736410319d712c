//! OpenSSH client invocations: the non-interactive login probe and interactive sessions.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::time::Duration;

use crate::diagnostics::DiagnosticSink;
use crate::errors::RuntimeError;
use crate::util::exec::{ExecRequest, ExecService};

pub const LOOPBACK: &str = "127.0.0.1";

/// Options shared by every connection: the container's host key changes on each rebuild,
/// so nothing is verified or remembered.
pub fn ephemeral_host_options() -> Vec<String> {
    [
        "StrictHostKeyChecking=no",
        "UserKnownHostsFile=/dev/null",
        "LogLevel=ERROR",
    ]
    .iter()
    .flat_map(|o| ["-o".to_string(), (*o).to_string()])
    .collect()
}

/// Private key path for a `.pub` file, if it exists next to it.
pub fn private_key_for(public_key: &Path) -> Option<PathBuf> {
    let s = public_key.to_str()?;
    let private = PathBuf::from(s.strip_suffix(".pub")?);
    private.is_file().then_some(private)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub success: bool,
    pub stderr: String,
}

/// Non-interactive login check.
pub trait LoginProbe {
    fn try_login(
        &self,
        user: &str,
        port: u16,
        identity: Option<&Path>,
    ) -> Result<LoginAttempt, RuntimeError>;
}

pub struct OpenSsh {
    ssh: PathBuf,
    exec: ExecService,
    sink: Arc<dyn DiagnosticSink>,
}

impl OpenSsh {
    pub fn new(sink: Arc<dyn DiagnosticSink>, timeout: Duration) -> Result<Self, RuntimeError> {
        Ok(OpenSsh {
            ssh: crate::docker::ssh_client_path()?,
            exec: ExecService::new(timeout),
            sink,
        })
    }

    pub fn path(&self) -> &Path {
        &self.ssh
    }

    fn base_args(user: &str, port: u16, identity: Option<&Path>) -> Vec<String> {
        let mut args = vec!["-p".to_string(), port.to_string()];
        args.extend(ephemeral_host_options());
        if let Some(key) = identity {
            args.push("-i".to_string());
            args.push(key.display().to_string());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }
        args.push(format!("{user}@{LOOPBACK}"));
        args
    }

    /// Spawn an interactive session with inherited stdio.
    pub fn open_interactive(
        &self,
        user: &str,
        port: u16,
        identity: Option<&Path>,
    ) -> io::Result<SessionHandle> {
        let args = Self::base_args(user, port, identity);
        let mut words = vec!["ssh".to_string()];
        words.extend(args.iter().cloned());
        self.sink.command(&crate::util::shell_join(&words));
        let mut cmd = Command::new(&self.ssh);
        cmd.args(&args);
        SessionHandle::spawn(cmd)
    }
}

impl LoginProbe for OpenSsh {
    fn try_login(
        &self,
        user: &str,
        port: u16,
        identity: Option<&Path>,
    ) -> Result<LoginAttempt, RuntimeError> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
        ];
        args.extend(Self::base_args(user, port, identity));
        args.push("true".to_string());
        let req = ExecRequest::new(&self.ssh).args(args).stream_as("ssh");
        let command = req.display();
        let out = self
            .exec
            .run(req, self.sink.as_ref())
            .map_err(|e| RuntimeError::Io(io::Error::other(format!("{e:#}"))))?;
        if out.timed_out() {
            return Err(RuntimeError::Timeout {
                command,
                after: out.timeout,
            });
        }
        Ok(LoginAttempt {
            success: out.success(),
            stderr: out.stderr,
        })
    }
}

type Continuation = Box<dyn FnOnce(Option<i32>) + Send>;

/// A running interactive session. Continuations registered with `on_closed` run exactly
/// once, after the client exits, in registration order.
pub struct SessionHandle {
    child: Child,
    continuations: Vec<Continuation>,
    closed: bool,
}

impl SessionHandle {
    pub fn spawn(mut cmd: Command) -> io::Result<Self> {
        let child = cmd.spawn()?;
        Ok(SessionHandle {
            child,
            continuations: Vec::new(),
            closed: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn on_closed(&mut self, f: impl FnOnce(Option<i32>) + Send + 'static) -> &mut Self {
        self.continuations.push(Box::new(f));
        self
    }

    /// Block until the session ends, then run the close continuations.
    pub fn wait(mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait();
        self.fire(status.as_ref().ok().and_then(|s| s.code()));
        status
    }

    fn fire(&mut self, code: Option<i32>) {
        if self.closed {
            return;
        }
        self.closed = true;
        for f in self.continuations.drain(..) {
            f(code);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.closed {
            let code = self.child.wait().ok().and_then(|s| s.code());
            self.fire(code);
        }
    }
}
