//! Key-based access for the effective user, verified with a real login.
//!
//! Nothing here raises: every failure is reported through the sink and turns into
//! `AccessReport::ok == false`, after which the caller offers manual connection steps.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::decision::DecisionProvider;
use crate::diagnostics::DiagnosticSink;
use crate::docker::{exec_shell, ContainerRuntime};
use crate::util::{shell_escape, ShellScript};

use super::client::{private_key_for, LoginProbe};

/// Conventional public keys, in preference order.
pub const KEY_CANDIDATES: [&str; 2] = ["id_ed25519.pub", "id_rsa.pub"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// The local ssh client rejected its own configuration.
    LocalConfig,
    /// The container refused the login (missing key, permissions, daemon not ready).
    AuthBlocked,
}

/// Bad lines in `~/.ssh/config` (or a bad `-o`) make ssh exit before connecting.
pub fn classify_login_failure(stderr: &str) -> LoginFailure {
    let s = stderr.to_ascii_lowercase();
    let local = [
        "bad configuration option",
        "bad owner or permissions on",
        "terminating, ",
        "configuration file",
    ];
    if local.iter().any(|needle| s.contains(needle)) {
        LoginFailure::LocalConfig
    } else {
        LoginFailure::AuthBlocked
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReport {
    pub ok: bool,
    pub public_key: Option<PathBuf>,
    pub identity_file: Option<PathBuf>,
    pub failure: Option<LoginFailure>,
}

/// Account names safe to put after `~` in a shell word.
fn plain_account_name(user: &str) -> bool {
    !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !user.starts_with('-')
}

fn fallback_home(user: &str) -> String {
    if user == "root" {
        "/root".to_string()
    } else {
        format!("/home/{user}")
    }
}

/// First non-empty line of a public key file.
pub fn read_public_key(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
}

/// Script run as root that installs the key passed on stdin. Re-running it never
/// duplicates the line.
pub fn install_key_script(user: &str, home: &str) -> io::Result<String> {
    let ssh_dir = shell_escape(&format!("{home}/.ssh"));
    let keys = shell_escape(&format!("{home}/.ssh/authorized_keys"));
    let owner = shell_escape(user);
    ShellScript::new()
        .push("set -e")
        .push("key=$(cat)")
        .push(format!("mkdir -p {ssh_dir}"))
        .push(format!("chmod 700 {ssh_dir}"))
        .push(format!("touch {keys}"))
        .push(format!("chmod 600 {keys}"))
        .push(format!(
            "grep -qxF \"$key\" {keys} || printf '%s\\n' \"$key\" >> {keys}"
        ))
        .push(format!("chown -R {owner} {ssh_dir} 2>/dev/null || true"))
        .build()
}

pub struct Bootstrap<'a, R: ContainerRuntime + ?Sized, D: DecisionProvider + ?Sized, P: LoginProbe + ?Sized> {
    runtime: &'a R,
    decisions: &'a D,
    probe: &'a P,
    sink: &'a dyn DiagnosticSink,
    ssh_dir: Option<PathBuf>,
}

impl<'a, R, D, P> Bootstrap<'a, R, D, P>
where
    R: ContainerRuntime + ?Sized,
    D: DecisionProvider + ?Sized,
    P: LoginProbe + ?Sized,
{
    pub fn new(runtime: &'a R, decisions: &'a D, probe: &'a P, sink: &'a dyn DiagnosticSink) -> Self {
        Bootstrap {
            runtime,
            decisions,
            probe,
            sink,
            ssh_dir: home::home_dir().map(|h| h.join(".ssh")),
        }
    }

    /// Look for keys in `dir` instead of `~/.ssh`.
    pub fn with_ssh_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ssh_dir = Some(dir.into());
        self
    }

    pub fn setup_access(&self, container: &str, user: &str, port: u16) -> bool {
        self.setup_access_report(container, user, port).ok
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub fn setup_access_report(&self, container: &str, user: &str, port: u16) -> AccessReport {
        let public_key = self.resolve_public_key();
        match &public_key {
            Some(key) => self.install_key(container, user, key),
            None => self
                .sink
                .note("no public key found; skipping key installation"),
        }
        let identity_file = public_key.as_deref().and_then(private_key_for);

        let failure = match self.probe.try_login(user, port, identity_file.as_deref()) {
            Ok(attempt) if attempt.success => None,
            Ok(attempt) => {
                let kind = classify_login_failure(&attempt.stderr);
                let hint = match kind {
                    LoginFailure::LocalConfig => {
                        "ssh rejected the local client configuration (check ~/.ssh/config)"
                    }
                    LoginFailure::AuthBlocked => "the container refused the key-based login",
                };
                self.sink
                    .note(&format!("login check for {user}@127.0.0.1:{port} failed: {hint}"));
                Some(kind)
            }
            Err(e) => {
                self.sink.note(&format!("login check could not run: {e}"));
                Some(LoginFailure::AuthBlocked)
            }
        };
        AccessReport {
            ok: failure.is_none(),
            public_key,
            identity_file,
            failure,
        }
    }

    /// `~/.ssh/id_ed25519.pub`, else `~/.ssh/id_rsa.pub`, else ask.
    pub fn resolve_public_key(&self) -> Option<PathBuf> {
        let candidates: Vec<PathBuf> = self
            .ssh_dir
            .iter()
            .flat_map(|d| KEY_CANDIDATES.iter().map(move |k| d.join(k)))
            .collect();
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Some(found.clone());
        }
        self.decisions.pick_public_key(&candidates)
    }

    fn remote_home(&self, container: &str, user: &str) -> String {
        if !plain_account_name(user) {
            return fallback_home(user);
        }
        let expanded = exec_shell(
            self.runtime,
            container,
            Some("root"),
            &format!("eval echo ~{user}"),
            None,
        );
        match expanded {
            Ok(out) if out.success() => {
                let home = out.stdout.trim();
                if home.starts_with('/') {
                    home.to_string()
                } else {
                    fallback_home(user)
                }
            }
            _ => fallback_home(user),
        }
    }

    fn install_key(&self, container: &str, user: &str, key_path: &Path) {
        let Some(key) = read_public_key(key_path) else {
            self.sink
                .note(&format!("{} is empty or unreadable; skipping key installation", key_path.display()));
            return;
        };
        let home = self.remote_home(container, user);
        let script = match install_key_script(user, &home) {
            Ok(s) => s,
            Err(e) => {
                self.sink.note(&format!("cannot build key installation script: {e}"));
                return;
            }
        };
        let payload = format!("{key}\n");
        match exec_shell(
            self.runtime,
            container,
            Some("root"),
            &script,
            Some(payload.as_bytes()),
        ) {
            Ok(out) if out.success() => {
                tracing::info!(user, home = %home, key = %key_path.display(), "public key installed");
            }
            Ok(out) => self.sink.note(&format!(
                "installing the public key for {user} failed: {}",
                out.stderr.trim()
            )),
            Err(e) => self
                .sink
                .note(&format!("installing the public key for {user} failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_login_failure() {
        assert_eq!(
            classify_login_failure("/home/me/.ssh/config: line 3: Bad configuration option: foo\n"),
            LoginFailure::LocalConfig
        );
        assert_eq!(
            classify_login_failure("Bad owner or permissions on /home/me/.ssh/config\n"),
            LoginFailure::LocalConfig
        );
        assert_eq!(
            classify_login_failure("vscode@127.0.0.1: Permission denied (publickey).\n"),
            LoginFailure::AuthBlocked
        );
        assert_eq!(
            classify_login_failure("Connection refused"),
            LoginFailure::AuthBlocked
        );
    }

    #[test]
    fn test_install_key_script_is_idempotent_append() {
        let s = install_key_script("vscode", "/home/vscode").expect("script");
        assert!(s.contains("grep -qxF \"$key\" /home/vscode/.ssh/authorized_keys ||"));
        assert!(s.contains("chmod 700 /home/vscode/.ssh"));
        assert!(s.contains("chmod 600 /home/vscode/.ssh/authorized_keys"));
        assert!(s.contains("chown -R vscode /home/vscode/.ssh"));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn test_read_public_key_first_line() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("k.pub");
        fs::write(&p, "\n# comment\nssh-ed25519 AAAA me@host\n").expect("write");
        assert_eq!(read_public_key(&p).as_deref(), Some("ssh-ed25519 AAAA me@host"));
        fs::write(&p, "\n").expect("write");
        assert_eq!(read_public_key(&p), None);
    }

    #[test]
    fn test_plain_account_name() {
        assert!(plain_account_name("vscode"));
        assert!(plain_account_name("dev.user-1"));
        assert!(!plain_account_name("a;rm -rf /"));
        assert!(!plain_account_name("-x"));
        assert!(!plain_account_name(""));
        assert_eq!(fallback_home("root"), "/root");
        assert_eq!(fallback_home("node"), "/home/node");
    }
}
