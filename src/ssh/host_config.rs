//! `Host <alias>` blocks in the user's SSH client config.
//!
//! A block runs from its `Host` line up to the next `Host`/`Match` line. Only a block whose
//! `Host` line names exactly one pattern equal to the alias is touched; everything else in
//! the file is preserved byte for byte.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::lock::lock_exclusive_blocking;
use crate::util::fs::write_atomic;
use crate::util::reject_newlines;

const MANAGED_COMMENT: &str = "# managed by codium-devcontainer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBlock {
    pub alias: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
}

impl HostBlock {
    pub fn render(&self) -> String {
        let mut s = format!("Host {}\n", self.alias);
        s.push_str(&format!("    {MANAGED_COMMENT}\n"));
        s.push_str("    HostName 127.0.0.1\n");
        s.push_str(&format!("    Port {}\n", self.port));
        s.push_str(&format!("    User {}\n", self.user));
        s.push_str("    StrictHostKeyChecking no\n");
        s.push_str("    UserKnownHostsFile /dev/null\n");
        s.push_str("    LogLevel ERROR\n");
        if let Some(id) = &self.identity_file {
            s.push_str(&format!("    IdentityFile \"{}\"\n", id.display()));
            s.push_str("    IdentitiesOnly yes\n");
        }
        s
    }
}

fn keyword(line: &str) -> Option<String> {
    line.split_whitespace()
        .next()
        .map(|k| k.trim_end_matches('=').to_ascii_lowercase())
}

fn starts_section(line: &str) -> bool {
    matches!(keyword(line).as_deref(), Some("host") | Some("match"))
}

fn is_host_line_for(line: &str, alias: &str) -> bool {
    if keyword(line).as_deref() != Some("host") {
        return false;
    }
    let patterns: Vec<&str> = line
        .split_whitespace()
        .skip(1)
        .flat_map(|w| w.split('='))
        .filter(|w| !w.is_empty())
        .collect();
    patterns == [alias]
}

/// Byte range of the block for `alias` as (first line, one past last line) indices.
fn find_block(lines: &[&str], alias: &str) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| is_host_line_for(l, alias))?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| starts_section(l))
        .map(|i| start + 1 + i)
        .unwrap_or(lines.len());
    Some((start, end))
}

/// Strip blank lines at the end of a block so the separator before the next block stays one
/// line.
fn trim_trailing_blank(lines: &[&str], start: usize, mut end: usize) -> usize {
    while end > start + 1 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    end
}

pub fn upsert_text(existing: &str, block: &HostBlock) -> String {
    let lines: Vec<&str> = existing.lines().collect();
    let rendered = block.render();
    match find_block(&lines, &block.alias) {
        Some((start, end)) => {
            let end = trim_trailing_blank(&lines, start, end);
            let mut out = String::new();
            for l in &lines[..start] {
                out.push_str(l);
                out.push('\n');
            }
            out.push_str(&rendered);
            for l in &lines[end..] {
                out.push_str(l);
                out.push('\n');
            }
            out
        }
        None => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.trim().is_empty() && !out.ends_with("\n\n") {
                out.push('\n');
            }
            out.push_str(&rendered);
            out
        }
    }
}

/// Text with the block for `alias` removed, or `None` when there is no such block.
pub fn remove_text(existing: &str, alias: &str) -> Option<String> {
    let lines: Vec<&str> = existing.lines().collect();
    let (start, end) = find_block(&lines, alias)?;
    let mut kept: Vec<&str> = lines[..start].to_vec();
    // Drop the blank separator that preceded the block.
    while kept.last().is_some_and(|l| l.trim().is_empty()) && end >= lines.len() {
        kept.pop();
    }
    kept.extend_from_slice(&lines[end..]);
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}

fn lock_path_for(config: &Path) -> PathBuf {
    let mut name = config
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".codium-devcontainer.lock");
    config.with_file_name(name)
}

fn read_or_empty(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

fn validate(block: &HostBlock) -> io::Result<()> {
    let identity = block
        .identity_file
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    for (what, value) in [
        ("host alias", block.alias.as_str()),
        ("user", block.user.as_str()),
        ("identity file", identity.as_str()),
    ] {
        reject_newlines(value, what).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    }
    if block.alias.trim().is_empty() || block.alias.contains(char::is_whitespace) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid host alias {:?}", block.alias),
        ));
    }
    Ok(())
}

/// Insert or replace the block for `block.alias` in `config`.
pub fn upsert_host_block(config: &Path, block: &HostBlock) -> io::Result<()> {
    validate(block)?;
    if let Some(parent) = config.parent() {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        if parent.file_name().is_some_and(|n| n == ".ssh") {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }
    let _guard = lock_exclusive_blocking(&lock_path_for(config))?;
    let existing = read_or_empty(config)?;
    let updated = upsert_text(&existing, block);
    if updated != existing {
        write_atomic(config, &updated)?;
        tracing::info!(alias = %block.alias, port = block.port, path = %config.display(), "ssh host entry written");
    }
    Ok(())
}

/// Remove the block for `alias`. Returns whether one was removed.
pub fn remove_host_block(config: &Path, alias: &str) -> io::Result<bool> {
    if !config.exists() {
        return Ok(false);
    }
    let _guard = lock_exclusive_blocking(&lock_path_for(config))?;
    let existing = read_or_empty(config)?;
    match remove_text(&existing, alias) {
        Some(updated) => {
            write_atomic(config, &updated)?;
            tracing::info!(alias, path = %config.display(), "ssh host entry removed");
            Ok(true)
        }
        None => Ok(false),
    }
}
