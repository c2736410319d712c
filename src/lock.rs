use fs2::FileExt;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::ReconcileError;

/// Workspace-scoped lock guard. The lock file stays in place after release so a process
/// that already opened it never locks an inode the next caller no longer sees.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Guard for a blocking lock on a shared file; the lock file is left in place.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(p: &Path) -> io::Result<File> {
    if let Some(parent) = p.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(p)
}

/// Single-flight guard for one workspace: fails fast with `Busy` when another process
/// already reconciles the same slug.
pub fn acquire_session_lock(slug: &str) -> Result<SessionLock, ReconcileError> {
    let mut last_err: Option<io::Error> = None;
    for p in candidate_lock_paths(slug) {
        match acquire_lock_at(&p) {
            Ok(lock) => {
                tracing::debug!(path = %p.display(), "session lock acquired");
                return Ok(lock);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::warn!(slug, "session lock held by another process");
                return Err(ReconcileError::Busy(slug.to_string()));
            }
            Err(e) => last_err = Some(e),
        }
    }
    let mut msg = String::from("failed to create session lock in any candidate location: ");
    msg.push_str(
        &candidate_lock_paths(slug)
            .into_iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    if let Some(e) = last_err {
        msg.push_str(&format!(" (last error: {e})"));
    }
    Err(ReconcileError::Io(io::Error::other(msg)))
}

/// Non-blocking exclusive lock at a specific path. A held lock is `ErrorKind::WouldBlock`.
pub fn acquire_lock_at(p: &Path) -> io::Result<SessionLock> {
    let f = open_lock_file(p)?;
    match f.try_lock_exclusive() {
        Ok(()) => Ok(SessionLock {
            file: f,
            path: p.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || is_contended(&e) => Err(
            io::Error::new(io::ErrorKind::WouldBlock, "lock held by another process"),
        ),
        Err(e) => Err(e),
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Blocking exclusive lock, used to serialize read-modify-write of shared files.
pub fn lock_exclusive_blocking(p: &Path) -> io::Result<FileLock> {
    let f = open_lock_file(p)?;
    f.lock_exclusive()?;
    Ok(FileLock { file: f })
}

/// Ordered candidate locations for a workspace lock:
/// `$XDG_RUNTIME_DIR/codium-devcontainer.<slug>.lock`, then the same name under the temp dir.
pub fn candidate_lock_paths(slug: &str) -> Vec<PathBuf> {
    let name = format!("codium-devcontainer.{slug}.lock");
    let mut paths = Vec::new();
    if let Some(rt) = env::var("XDG_RUNTIME_DIR").ok().filter(|s| !s.is_empty()) {
        paths.push(PathBuf::from(rt).join(&name));
    }
    paths.push(env::temp_dir().join(&name));
    paths
}
