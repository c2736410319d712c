#![allow(clippy::module_name_repetitions)]
//! Devcontainer config loading (consumed as data only) and host settings from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

/// Base image used when the devcontainer config does not declare one.
pub const DEFAULT_FALLBACK_IMAGE: &str = "mcr.microsoft.com/devcontainers/base:ubuntu";

/// Fields read from `devcontainer.json`. Everything else in the file is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevcontainerConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub remote_user: Option<String>,
    #[serde(default)]
    pub post_create_command: Option<Value>,
    #[serde(default)]
    pub workspace_folder: Option<String>,
}

impl DevcontainerConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&raw).map_err(|e| format!("cannot parse {}: {}", path.display(), e))
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&strip_jsonc(raw))
    }

    /// `postCreateCommand` normalized to a list of shell steps.
    ///
    /// - string: one step
    /// - array: argv of a single step, shell-escaped and joined
    /// - object: each value (string or argv array) is a step, in key order
    pub fn post_create_steps(&self) -> Vec<String> {
        let Some(value) = self.post_create_command.as_ref() else {
            return Vec::new();
        };
        let mut steps = Vec::new();
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for k in keys {
                    if let Some(step) = map.get(k).and_then(step_from_value) {
                        steps.push(step);
                    }
                }
            }
            other => {
                if let Some(step) = step_from_value(other) {
                    steps.push(step);
                }
            }
        }
        steps
    }
}

fn step_from_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(items) => {
            let words: Vec<String> = items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect();
            (!words.is_empty()).then(|| crate::util::shell_join(&words))
        }
        _ => None,
    }
}

/// Remove `//` and `/* */` comments plus trailing commas so JSONC parses as JSON.
pub fn strip_jsonc(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    let mut in_str = false;
    let mut esc = false;
    while let Some(ch) = chars.next() {
        if in_str {
            out.push(ch);
            if esc {
                esc = false;
            } else if ch == '\\' {
                esc = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_str = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(ch),
        }
    }
    drop_trailing_commas(&out)
}

fn drop_trailing_commas(s: &str) -> String {
    let bytes: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_str = false;
    let mut esc = false;
    for (i, &ch) in bytes.iter().enumerate() {
        if in_str {
            out.push(ch);
            if esc {
                esc = false;
            } else if ch == '\\' {
                esc = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        if ch == '"' {
            in_str = true;
        }
        if ch == ',' {
            let next = bytes[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Find the devcontainer config for a project: `.devcontainer/devcontainer.json`, then
/// `.devcontainer.json`.
pub fn locate(project_dir: &Path) -> Option<PathBuf> {
    [
        project_dir.join(".devcontainer").join("devcontainer.json"),
        project_dir.join(".devcontainer.json"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Host-side settings (`CODIUM_DEVCONTAINER_*` environment variables).
#[derive(Debug, Clone)]
pub struct Settings {
    pub fallback_image: String,
    pub supervisor_bin: Option<PathBuf>,
    pub ssh_config: Option<PathBuf>,
    pub inspect_timeout: Duration,
    pub build_timeout: Duration,
    pub run_timeout: Duration,
    pub exec_timeout: Duration,
    pub ssh_timeout: Duration,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            fallback_image: DEFAULT_FALLBACK_IMAGE.to_string(),
            supervisor_bin: None,
            ssh_config: None,
            inspect_timeout: Duration::from_secs(30),
            build_timeout: Duration::from_secs(1800),
            run_timeout: Duration::from_secs(120),
            exec_timeout: Duration::from_secs(60),
            ssh_timeout: Duration::from_secs(20),
            verbose: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let d = Settings::default();
        Settings {
            fallback_image: env_nonempty("CODIUM_DEVCONTAINER_FALLBACK_IMAGE")
                .unwrap_or(d.fallback_image),
            supervisor_bin: env_nonempty("CODIUM_DEVCONTAINER_SUPERVISOR_BIN").map(PathBuf::from),
            ssh_config: env_nonempty("CODIUM_DEVCONTAINER_SSH_CONFIG").map(PathBuf::from),
            inspect_timeout: env_secs("CODIUM_DEVCONTAINER_INSPECT_TIMEOUT")
                .unwrap_or(d.inspect_timeout),
            build_timeout: env_secs("CODIUM_DEVCONTAINER_BUILD_TIMEOUT").unwrap_or(d.build_timeout),
            run_timeout: env_secs("CODIUM_DEVCONTAINER_RUN_TIMEOUT").unwrap_or(d.run_timeout),
            exec_timeout: env_secs("CODIUM_DEVCONTAINER_EXEC_TIMEOUT").unwrap_or(d.exec_timeout),
            ssh_timeout: env_secs("CODIUM_DEVCONTAINER_SSH_TIMEOUT").unwrap_or(d.ssh_timeout),
            verbose: env::var("CODIUM_DEVCONTAINER_VERBOSE").ok().as_deref() == Some("1"),
        }
    }

    /// SSH client config path: override, else `~/.ssh/config`.
    pub fn ssh_config_path(&self) -> Option<PathBuf> {
        self.ssh_config
            .clone()
            .or_else(|| home::home_dir().map(|h| h.join(".ssh").join("config")))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Positive integer seconds; zero or garbage means "use the default".
pub fn parse_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .map(Duration::from_secs)
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key).ok().as_deref().and_then(parse_secs)
}
