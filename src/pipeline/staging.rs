#![allow(clippy::module_name_repetitions)]
//! Staged build artifacts that clean up after themselves.
//!
//! A staged file is removed on drop only when this tool owns it. A file a user put in the
//! config directory (no ownership marker) is used as is and never removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::dockerfile;

/// File name of the staged supervisor binary (also the COPY source in the template).
pub const SUPERVISOR_FILE: &str = "codium-devcontainer-supervisor";

/// Sidecar stamp marking the staged supervisor as ours.
pub const SUPERVISOR_STAMP: &str = ".codium-devcontainer-supervisor.owned";

pub const DOCKERFILE: &str = "Dockerfile.codium-devcontainer";

#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    stamp: Option<PathBuf>,
    owned: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owned(&self) -> bool {
        self.owned
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        let _ = fs::remove_file(&self.path);
        if let Some(stamp) = &self.stamp {
            let _ = fs::remove_file(stamp);
        }
    }
}

/// Config directory created for staging; removed on drop if we created it and it is empty.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    created: bool,
}

impl StagingDir {
    pub fn prepare(path: &Path) -> io::Result<Self> {
        let created = !path.exists();
        fs::create_dir_all(path)?;
        Ok(StagingDir {
            path: path.to_path_buf(),
            created,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.created {
            // Fails harmlessly when something else lives there.
            let _ = fs::remove_dir(&self.path);
        }
    }
}

/// Put the supervisor binary into `dir` unless it is already there.
///
/// - absent: copy `source`, write the stamp, owned
/// - present with stamp: left from an earlier run, reused and owned
/// - present without stamp: user-provided, reused and never removed
pub fn stage_supervisor(dir: &Path, source: Option<&Path>) -> io::Result<StagedFile> {
    let path = dir.join(SUPERVISOR_FILE);
    let stamp = dir.join(SUPERVISOR_STAMP);
    if path.exists() {
        let owned = stamp.exists();
        tracing::debug!(path = %path.display(), owned, "supervisor already staged");
        return Ok(StagedFile {
            path,
            stamp: owned.then_some(stamp),
            owned,
        });
    }
    let source = source.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "supervisor binary not found; set CODIUM_DEVCONTAINER_SUPERVISOR_BIN to a Linux build of codium-devcontainer-supervisor",
        )
    })?;
    // Write the stamp first so a crash between the two steps still leaves an owned file.
    fs::write(&stamp, b"codium-devcontainer\n")?;
    let staged = StagedFile {
        path,
        stamp: Some(stamp),
        owned: true,
    };
    fs::copy(source, &staged.path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staged.path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(staged)
}

/// Write the synthesized build file unless a user-authored one (no marker) exists.
pub fn stage_dockerfile(dir: &Path, steps: &[String]) -> io::Result<StagedFile> {
    let path = dir.join(DOCKERFILE);
    if let Ok(existing) = fs::read_to_string(&path) {
        if !dockerfile::is_owned(&existing) {
            return Ok(StagedFile {
                path,
                stamp: None,
                owned: false,
            });
        }
    }
    let content = dockerfile::render(dockerfile::TEMPLATE, steps);
    let staged = StagedFile {
        path,
        stamp: None,
        owned: true,
    };
    fs::write(&staged.path, content)?;
    Ok(staged)
}

/// Default supervisor source: the binary shipped next to the running executable.
pub fn default_supervisor_source() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(SUPERVISOR_FILE);
    candidate.is_file().then_some(candidate)
}
