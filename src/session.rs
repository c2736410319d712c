//! Workspace identity: slug derivation and the per-workspace session record.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{DevcontainerConfig, Settings};

/// Prefix shared by the image tag, the container name and the SSH host alias.
pub const NAME_PREFIX: &str = "codium-devcontainer";

/// Slug used when a folder name has no usable characters.
pub const FALLBACK_SLUG: &str = "workspace";

/// Container-side mount point for the project folder when the config does not set one.
pub const DEFAULT_CONTAINER_WORKSPACE: &str = "/workspace";

/// Derive an engine-tag-safe identifier from a folder name.
///
/// Output is lowercase, limited to `[a-z0-9._-]`, never starts or ends with a separator,
/// never contains two separators in a row, and is never empty.
pub fn workspace_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep: Option<char> = None;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if let Some(sep) = pending_sep.take() {
                if !out.is_empty() {
                    out.push(sep);
                }
            }
            out.push(ch);
        } else {
            // Keep a lone '.', '_' or '-'; any other run of characters collapses to '-'.
            pending_sep = match pending_sep {
                None if matches!(ch, '.' | '_' | '-') => Some(ch),
                _ => Some('-'),
            };
        }
    }
    if out.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        out
    }
}

/// One workspace's container lifecycle, resolved from the project folder and its config.
#[derive(Debug, Clone)]
pub struct Session {
    pub project_dir: PathBuf,
    pub slug: String,
    pub image_name: String,
    pub container_name: String,
    pub base_image: String,
    pub remote_user: Option<String>,
    /// Directory build artifacts are staged into (normally `<project>/.devcontainer`).
    pub config_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Modification time of the devcontainer config, if one exists.
    pub config_fingerprint: Option<SystemTime>,
    pub post_create_steps: Vec<String>,
    pub container_workspace: String,
}

impl Session {
    /// Resolve a session for `project_dir`, reading its devcontainer config when present.
    pub fn load(project_dir: &Path, settings: &Settings) -> Result<Self, String> {
        let project_dir = std::fs::canonicalize(project_dir)
            .map_err(|e| format!("cannot resolve project folder {}: {e}", project_dir.display()))?;
        let located = crate::config::locate(&project_dir);
        let config = match located.as_deref() {
            Some(p) => DevcontainerConfig::load(p)?,
            None => DevcontainerConfig::default(),
        };
        Ok(Self::from_parts(project_dir, located, config, settings))
    }

    pub fn from_parts(
        project_dir: PathBuf,
        config_path: Option<PathBuf>,
        config: DevcontainerConfig,
        settings: &Settings,
    ) -> Self {
        let folder = project_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let slug = workspace_slug(&folder);
        let name = format!("{NAME_PREFIX}-{slug}");
        let config_fingerprint = config_path
            .as_deref()
            .and_then(crate::util::fs::modified_time);
        let config_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|d| d.file_name().map(|n| n == ".devcontainer").unwrap_or(false))
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_dir.join(".devcontainer"));
        Session {
            slug,
            image_name: name.clone(),
            container_name: name,
            base_image: config
                .image
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| settings.fallback_image.clone()),
            remote_user: config.remote_user.clone().filter(|s| !s.trim().is_empty()),
            config_dir,
            config_fingerprint,
            post_create_steps: config.post_create_steps(),
            container_workspace: config
                .workspace_folder
                .clone()
                .filter(|s| s.starts_with('/'))
                .unwrap_or_else(|| DEFAULT_CONTAINER_WORKSPACE.to_string()),
            config_path,
            project_dir,
        }
    }

    /// Host path of the stop-request marker (the project folder is bind-mounted).
    pub fn stop_marker_path(&self) -> PathBuf {
        self.project_dir.join(crate::supervisor::STOP_MARKER_NAME)
    }
}
