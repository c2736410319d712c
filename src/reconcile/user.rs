//! Effective remote user: configured, else the container's default identity, else a
//! better non-superuser account when that identity is root.

use crate::docker::{exec_shell, ContainerRuntime};
use crate::errors::RuntimeError;

/// First non-system uid when `/etc/login.defs` does not say otherwise.
pub const DEFAULT_UID_MIN: u32 = 1000;

const NOBODY_UID: u32 = 65534;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveUser {
    pub name: String,
    /// Set when the result is root because no alternative account was found.
    pub notice: Option<String>,
}

impl EffectiveUser {
    fn plain(name: impl Into<String>) -> Self {
        EffectiveUser {
            name: name.into(),
            notice: None,
        }
    }
}

pub fn resolve_effective_user<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container: &str,
    configured: Option<&str>,
) -> Result<EffectiveUser, RuntimeError> {
    if let Some(u) = configured.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(EffectiveUser::plain(u));
    }

    let current = exec_shell(runtime, container, None, "id -un", None)?;
    let current = current.stdout.trim();
    let current = if current.is_empty() { "root" } else { current };
    if current != "root" {
        return Ok(EffectiveUser::plain(current));
    }

    let defs = exec_shell(
        runtime,
        container,
        None,
        "cat /etc/login.defs 2>/dev/null",
        None,
    )?;
    let uid_min = parse_uid_min(&defs.stdout);
    let passwd = exec_shell(
        runtime,
        container,
        None,
        "getent passwd 2>/dev/null || cat /etc/passwd",
        None,
    )?;
    if let Some(name) = pick_account(&passwd.stdout, uid_min) {
        tracing::info!(user = %name, uid_min, "using non-root account from passwd");
        return Ok(EffectiveUser::plain(name));
    }

    let homes = exec_shell(runtime, container, None, "ls -1 /home 2>/dev/null", None)?;
    if let Some(name) = first_home_dir(&homes.stdout) {
        tracing::info!(user = %name, "using first /home directory as account");
        return Ok(EffectiveUser::plain(name));
    }

    Ok(EffectiveUser {
        name: "root".to_string(),
        notice: Some(format!(
            "{container} only has a root account; connecting as root. Set remoteUser in devcontainer.json to use another account."
        )),
    })
}

/// `UID_MIN` from login.defs content, else `DEFAULT_UID_MIN`.
pub fn parse_uid_min(login_defs: &str) -> u32 {
    login_defs
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            let mut it = l.split_whitespace();
            (it.next() == Some("UID_MIN"))
                .then(|| it.next())
                .flatten()
                .and_then(|v| v.parse::<u32>().ok())
        })
        .unwrap_or(DEFAULT_UID_MIN)
}

/// First passwd entry with `uid >= uid_min` that can log in.
pub fn pick_account(passwd: &str, uid_min: u32) -> Option<String> {
    for line in passwd.lines() {
        let fields: Vec<&str> = line.trim().split(':').collect();
        if fields.len() < 7 {
            continue;
        }
        let Ok(uid) = fields[2].parse::<u32>() else {
            continue;
        };
        let shell = fields[6];
        if uid < uid_min || uid == NOBODY_UID {
            continue;
        }
        if shell.ends_with("nologin") || shell.ends_with("/false") {
            continue;
        }
        if !fields[0].is_empty() {
            return Some(fields[0].to_string());
        }
    }
    None
}

/// First directory name in `ls -1 /home` output.
pub fn first_home_dir(listing: &str) -> Option<String> {
    listing
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('.') && *l != "lost+found")
        .map(str::to_string)
}
