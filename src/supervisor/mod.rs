#![allow(clippy::module_name_repetitions)]
//! In-container entrypoint: owns the SSH daemon and stops the container when nobody uses it.
//!
//! Each poll, after sleeping one check interval:
//! 1. a stop marker in the workspace is consumed and ends supervision
//! 2. an established SSH connection resets the idle time, otherwise the interval is added
//! 3. idle time at or past the grace period ends supervision
//! 4. a dead daemon is fatal and exits without cleanup
//!
//! A termination signal ends supervision at the next wakeup. As PID 1 the supervisor
//! also reaps re-parented orphans on every poll.

mod daemon;
mod probe;
mod reap;

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use daemon::{Daemon, SshDaemon};
pub use probe::{count_established, count_established_ss, ConnectionProbe, ProcNetProbe};
pub use reap::reap_orphans;

/// Sentinel file name inside the workspace.
pub const STOP_MARKER_NAME: &str = ".codium-devcontainer-stop";

pub const ENV_WORKSPACE: &str = "CODIUM_WS";
pub const ENV_CHECK_INTERVAL: &str = "CHECK_INTERVAL";
pub const ENV_IDLE_GRACE: &str = "IDLE_GRACE_SECONDS";
pub const ENV_SSHD_PATH: &str = "SSHD_PATH";
pub const ENV_SSH_PORT: &str = "SSH_PORT";

pub const DEFAULT_WORKSPACE: &str = "/workspace";
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_IDLE_GRACE: Duration = Duration::from_secs(60);
pub const DEFAULT_SSHD_PATH: &str = "/usr/sbin/sshd";

/// How long sshd gets to exit after SIGTERM before it is killed.
pub const DAEMON_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub workspace: PathBuf,
    pub check_interval: Duration,
    pub idle_grace: Duration,
    pub sshd_path: PathBuf,
    pub ssh_port: u16,
    /// Collect exited orphans each poll; on when running as PID 1.
    pub reap_orphans: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
            check_interval: DEFAULT_CHECK_INTERVAL,
            idle_grace: DEFAULT_IDLE_GRACE,
            sshd_path: PathBuf::from(DEFAULT_SSHD_PATH),
            ssh_port: crate::docker::CONTAINER_SSH_PORT,
            reap_orphans: false,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> Self {
        SupervisorConfig {
            reap_orphans: std::process::id() == 1,
            ..Self::from_lookup(|k| env::var(k).ok())
        }
    }

    /// Invalid or zero values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = SupervisorConfig::default();
        let nonempty = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        SupervisorConfig {
            workspace: nonempty(ENV_WORKSPACE).map(PathBuf::from).unwrap_or(d.workspace),
            check_interval: nonempty(ENV_CHECK_INTERVAL)
                .as_deref()
                .and_then(crate::config::parse_secs)
                .unwrap_or(d.check_interval),
            idle_grace: nonempty(ENV_IDLE_GRACE)
                .as_deref()
                .and_then(crate::config::parse_secs)
                .unwrap_or(d.idle_grace),
            sshd_path: nonempty(ENV_SSHD_PATH).map(PathBuf::from).unwrap_or(d.sshd_path),
            ssh_port: nonempty(ENV_SSH_PORT)
                .and_then(|v| v.parse::<u16>().ok())
                .filter(|p| *p > 0)
                .unwrap_or(d.ssh_port),
            reap_orphans: d.reap_orphans,
        }
    }

    pub fn stop_marker(&self) -> PathBuf {
        self.workspace.join(STOP_MARKER_NAME)
    }
}

/// Idle accumulator: reset on activity, grows by one interval per idle poll.
#[derive(Debug, Clone)]
pub struct IdleTracker {
    elapsed: Duration,
    grace: Duration,
}

impl IdleTracker {
    pub fn new(grace: Duration) -> Self {
        IdleTracker {
            elapsed: Duration::ZERO,
            grace,
        }
    }

    /// Record one poll; returns true once the grace period is used up.
    pub fn observe(&mut self, connected: bool, interval: Duration) -> bool {
        if connected {
            self.elapsed = Duration::ZERO;
        } else {
            self.elapsed += interval;
        }
        self.expired()
    }

    pub fn expired(&self) -> bool {
        self.elapsed >= self.grace
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    IdleTimeout,
    StopRequested,
    Signal,
    DaemonDied(Option<i32>),
}

impl Exit {
    pub fn exit_code(&self) -> u8 {
        match self {
            Exit::DaemonDied(_) => 1,
            _ => 0,
        }
    }
}

pub type Sleeper = fn(&AtomicBool, Duration);

/// Sleep in short slices so a termination signal is noticed promptly.
pub fn interruptible_sleep(stop: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(100);
    let mut left = total;
    while !left.is_zero() && !stop.load(Ordering::SeqCst) {
        let step = left.min(slice);
        std::thread::sleep(step);
        left -= step;
    }
}

pub struct Supervisor<'a, P: ConnectionProbe, D: Daemon> {
    config: SupervisorConfig,
    probe: P,
    daemon: D,
    shutdown: &'a AtomicBool,
    sleep: Sleeper,
    polls: u32,
}

impl<'a, P: ConnectionProbe, D: Daemon> Supervisor<'a, P, D> {
    pub fn new(config: SupervisorConfig, probe: P, daemon: D, shutdown: &'a AtomicBool) -> Self {
        Supervisor {
            config,
            probe,
            daemon,
            shutdown,
            sleep: interruptible_sleep,
            polls: 0,
        }
    }

    pub fn with_sleeper(mut self, sleep: Sleeper) -> Self {
        self.sleep = sleep;
        self
    }

    /// Completed poll cycles.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    /// Supervise until a terminating condition, then stop the daemon (unless it died).
    pub fn run(&mut self) -> Exit {
        let exit = self.supervise();
        match exit {
            Exit::DaemonDied(code) => {
                tracing::error!(?code, "sshd is no longer running");
            }
            _ => {
                tracing::info!(?exit, "terminating");
                if let Err(e) = self.daemon.terminate(DAEMON_STOP_GRACE) {
                    tracing::warn!(error = %e, "stopping sshd failed");
                }
            }
        }
        exit
    }

    fn supervise(&mut self) -> Exit {
        let interval = self.config.check_interval;
        let marker = self.config.stop_marker();
        let mut idle = IdleTracker::new(self.config.idle_grace);
        tracing::info!(
            workspace = %self.config.workspace.display(),
            interval = %humantime::format_duration(interval),
            grace = %humantime::format_duration(self.config.idle_grace),
            "supervising"
        );
        loop {
            (self.sleep)(self.shutdown, interval);
            if self.shutdown.load(Ordering::SeqCst) {
                return Exit::Signal;
            }
            self.polls += 1;

            if self.config.reap_orphans {
                reap_orphans(self.daemon.pid());
            }

            if marker.exists() {
                if let Err(e) = fs::remove_file(&marker) {
                    tracing::warn!(error = %e, path = %marker.display(), "could not remove stop marker");
                }
                return Exit::StopRequested;
            }

            let connected = self.probe.has_established();
            if idle.observe(connected, interval) {
                tracing::info!(idle = %humantime::format_duration(idle.elapsed()), "idle grace period elapsed");
                return Exit::IdleTimeout;
            }
            tracing::debug!(connected, idle = ?idle.elapsed(), "poll");

            if !self.daemon.is_alive() {
                return Exit::DaemonDied(self.daemon.exit_code());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_tracker_resets_on_activity() {
        let mut t = IdleTracker::new(Duration::from_secs(6));
        let i = Duration::from_secs(2);
        assert!(!t.observe(false, i));
        assert!(!t.observe(false, i));
        assert!(!t.observe(true, i));
        assert_eq!(t.elapsed(), Duration::ZERO);
        assert!(!t.observe(false, i));
        assert!(!t.observe(false, i));
        assert!(t.observe(false, i));
    }

    #[test]
    fn test_config_from_lookup_defaults_and_overrides() {
        let d = SupervisorConfig::from_lookup(|_| None);
        assert_eq!(d, SupervisorConfig::default());

        let c = SupervisorConfig::from_lookup(|k| match k {
            ENV_WORKSPACE => Some("/workspaces/demo".to_string()),
            ENV_CHECK_INTERVAL => Some("0".to_string()),
            ENV_IDLE_GRACE => Some("10".to_string()),
            ENV_SSH_PORT => Some("nope".to_string()),
            _ => None,
        });
        assert_eq!(c.workspace, PathBuf::from("/workspaces/demo"));
        assert_eq!(c.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(c.idle_grace, Duration::from_secs(10));
        assert_eq!(c.ssh_port, 22);
        assert_eq!(
            c.stop_marker(),
            PathBuf::from("/workspaces/demo/.codium-devcontainer-stop")
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Exit::IdleTimeout.exit_code(), 0);
        assert_eq!(Exit::StopRequested.exit_code(), 0);
        assert_eq!(Exit::Signal.exit_code(), 0);
        assert_eq!(Exit::DaemonDied(Some(255)).exit_code(), 1);
    }

    #[test]
    fn test_interruptible_sleep_returns_when_flag_set() {
        let flag = AtomicBool::new(true);
        let start = std::time::Instant::now();
        interruptible_sleep(&flag, Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
