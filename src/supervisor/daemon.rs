//! The supervised SSH daemon child.

use std::fs;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

pub trait Daemon {
    /// False once the child has exited.
    fn is_alive(&mut self) -> bool;

    /// Exit code of a dead child, if it exited normally.
    fn exit_code(&mut self) -> Option<i32>;

    /// SIGTERM, wait up to `grace`, then SIGKILL.
    fn terminate(&mut self, grace: Duration) -> io::Result<()>;

    /// Process id, when the daemon is a real child of this process.
    fn pid(&self) -> Option<u32> {
        None
    }
}

pub struct SshDaemon {
    child: Child,
}

impl SshDaemon {
    /// `sshd -D -e -p <port>`: foreground, logging to stderr so `docker logs` shows it.
    pub fn spawn(sshd: &Path, port: u16) -> io::Result<Self> {
        // Privilege separation directory; lives on tmpfs in many images.
        let _ = fs::create_dir_all("/run/sshd");
        let child = Command::new(sshd)
            .args(["-D", "-e", "-p", &port.to_string()])
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                io::Error::new(e.kind(), format!("failed to start {}: {e}", sshd.display()))
            })?;
        tracing::info!(pid = child.id(), port, "sshd started");
        Ok(SshDaemon { child })
    }

    pub fn from_child(child: Child) -> Self {
        SshDaemon { child }
    }
}

impl Daemon for SshDaemon {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn exit_code(&mut self) -> Option<i32> {
        self.child.try_wait().ok().flatten().and_then(|s| s.code())
    }

    fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if !self.is_alive() {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
            tracing::warn!(error = %e, "SIGTERM to sshd failed");
        }
        match self.child.wait_timeout(grace)? {
            Some(status) => {
                tracing::info!(?status, "sshd exited");
                Ok(())
            }
            None => {
                tracing::warn!(grace = %humantime::format_duration(grace), "sshd ignored SIGTERM; killing");
                self.child.kill()?;
                self.child.wait().map(|_| ())
            }
        }
    }
}
