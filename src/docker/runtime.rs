#![allow(clippy::module_name_repetitions)]
//! Docker and ssh binary discovery.

use std::env;
use std::path::PathBuf;

use which::which;

use crate::errors::RuntimeError;

pub fn container_runtime_path() -> Result<PathBuf, RuntimeError> {
    // Allow tests or callers to explicitly disable Docker detection to avoid hard failures
    if env::var("CODIUM_DEVCONTAINER_SKIP_DOCKER").ok().as_deref() == Some("1") {
        return Err(RuntimeError::RuntimeMissing(
            "Docker disabled by environment override.".to_string(),
        ));
    }

    if let Ok(p) = which("docker") {
        return Ok(p);
    }
    Err(RuntimeError::RuntimeMissing(
        "Docker is required but was not found in PATH.".to_string(),
    ))
}

pub fn ssh_client_path() -> Result<PathBuf, RuntimeError> {
    which("ssh").map_err(|_| {
        RuntimeError::RuntimeMissing(
            "An OpenSSH client (ssh) is required but was not found in PATH.".to_string(),
        )
    })
}
