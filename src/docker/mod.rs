#![allow(clippy::module_name_repetitions)]
//! Container-engine primitives as typed operations.
//!
//! Query methods report absence as `Ok(false)` / `Ok(None)`; mutating methods report a
//! missing container as `RuntimeError::NotFound`. Anything else is an engine failure.

mod cli;
mod inspect;
mod runtime;

use std::path::PathBuf;
use std::time::SystemTime;

use crate::errors::RuntimeError;

pub use cli::DockerCli;
pub use inspect::{looks_not_found, parse_created, parse_port_output};
pub use runtime::{container_runtime_path, ssh_client_path};

/// Port the SSH daemon listens on inside the container.
pub const CONTAINER_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    pub dockerfile: PathBuf,
    pub tag: String,
    pub build_args: Vec<(String, String)>,
    pub context: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub env: Vec<(String, String)>,
    pub host_port: u16,
    pub container_port: u16,
    pub host_dir: PathBuf,
    pub container_dir: String,
}

/// Result of a command run inside the container. A non-zero `code` is not an engine error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait ContainerRuntime {
    fn exists(&self, name: &str) -> Result<bool, RuntimeError>;
    fn is_running(&self, name: &str) -> Result<bool, RuntimeError>;
    fn created_at(&self, name: &str) -> Result<Option<SystemTime>, RuntimeError>;
    fn mapped_port(&self, name: &str) -> Result<Option<u16>, RuntimeError>;
    fn start(&self, name: &str) -> Result<(), RuntimeError>;
    fn restart(&self, name: &str) -> Result<(), RuntimeError>;
    fn stop(&self, name: &str) -> Result<(), RuntimeError>;
    fn remove(&self, name: &str) -> Result<(), RuntimeError>;
    fn build(&self, spec: &BuildSpec) -> Result<(), RuntimeError>;
    fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError>;
    fn exec(
        &self,
        name: &str,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecResult, RuntimeError>;
}

/// Run `sh -c <script>` inside the container, optionally as `user`.
pub fn exec_shell<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    name: &str,
    user: Option<&str>,
    script: &str,
    stdin: Option<&[u8]>,
) -> Result<ExecResult, RuntimeError> {
    let mut argv: Vec<String> = Vec::new();
    if let Some(u) = user {
        argv.push("--user".to_string());
        argv.push(u.to_string());
    }
    argv.push("sh".to_string());
    argv.push("-c".to_string());
    argv.push(script.to_string());
    runtime.exec(name, &argv, stdin)
}
