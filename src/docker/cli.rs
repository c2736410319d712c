//! `ContainerRuntime` over the docker CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::Settings;
use crate::diagnostics::DiagnosticSink;
use crate::errors::RuntimeError;
use crate::util::exec::{ExecOutcome, ExecRequest, ExecService};

use super::inspect::{looks_not_found, looks_unpublished, parse_created, parse_port_output};
use super::{BuildSpec, ContainerRuntime, ExecResult, RunSpec, CONTAINER_SSH_PORT};

pub struct DockerCli {
    runtime: PathBuf,
    exec: ExecService,
    sink: Arc<dyn DiagnosticSink>,
    inspect_timeout: Duration,
    build_timeout: Duration,
    run_timeout: Duration,
    exec_timeout: Duration,
}

impl DockerCli {
    /// Locate docker and wire it to `sink`.
    pub fn new(sink: Arc<dyn DiagnosticSink>, settings: &Settings) -> Result<Self, RuntimeError> {
        let runtime = super::container_runtime_path()?;
        Ok(Self::with_runtime(runtime, sink, settings))
    }

    pub fn with_runtime(
        runtime: PathBuf,
        sink: Arc<dyn DiagnosticSink>,
        settings: &Settings,
    ) -> Self {
        DockerCli {
            runtime,
            exec: ExecService::new(settings.inspect_timeout),
            sink,
            inspect_timeout: settings.inspect_timeout,
            build_timeout: settings.build_timeout,
            run_timeout: settings.run_timeout,
            exec_timeout: settings.exec_timeout,
        }
    }

    fn request<I, S>(&self, args: I) -> ExecRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        ExecRequest::new(&self.runtime).args(args)
    }

    /// Run and return the outcome whatever the exit status; only spawn failures and
    /// timeouts are errors here.
    fn invoke(&self, req: ExecRequest) -> Result<ExecOutcome, RuntimeError> {
        let command = req.display();
        let outcome = self
            .exec
            .run(req, self.sink.as_ref())
            .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("{e:#}"))))?;
        if outcome.timed_out() {
            return Err(RuntimeError::Timeout {
                command,
                after: outcome.timeout,
            });
        }
        Ok(outcome)
    }

    /// Run and require success; a "no such container" failure becomes `NotFound(name)`.
    fn invoke_checked(&self, req: ExecRequest, name: &str) -> Result<ExecOutcome, RuntimeError> {
        let command = req.display();
        let outcome = self.invoke(req)?;
        if outcome.success() {
            return Ok(outcome);
        }
        if looks_not_found(&outcome.combined) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Err(RuntimeError::Engine {
            command,
            status: outcome.code(),
            output: outcome.combined,
        })
    }

    /// `docker container inspect -f <format> <name>`; None when the container is absent.
    fn inspect_field(&self, name: &str, format: &str) -> Result<Option<String>, RuntimeError> {
        let req = self
            .request(["container", "inspect", "--format", format, name])
            .timeout(self.inspect_timeout)
            .stream_quiet("docker inspect");
        match self.invoke_checked(req, name) {
            Ok(out) => Ok(Some(out.stdout.trim().to_string())),
            Err(RuntimeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.inspect_field(name, "{{.Id}}")?.is_some())
    }

    fn is_running(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.inspect_field(name, "{{.State.Running}}")?.as_deref() == Some("true"))
    }

    fn created_at(&self, name: &str) -> Result<Option<SystemTime>, RuntimeError> {
        Ok(self
            .inspect_field(name, "{{.Created}}")?
            .as_deref()
            .and_then(parse_created))
    }

    fn mapped_port(&self, name: &str) -> Result<Option<u16>, RuntimeError> {
        let req = self
            .request([
                "port".to_string(),
                name.to_string(),
                format!("{CONTAINER_SSH_PORT}/tcp"),
            ])
            .timeout(self.inspect_timeout)
            .stream_quiet("docker port");
        let command = req.display();
        let out = self.invoke(req)?;
        if out.success() {
            return Ok(parse_port_output(&out.stdout));
        }
        if looks_not_found(&out.combined) || looks_unpublished(&out.combined) {
            tracing::debug!(container = name, output = %out.combined.trim(), "no mapped port");
            return Ok(None);
        }
        Err(RuntimeError::Engine {
            command,
            status: out.code(),
            output: out.combined,
        })
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let req = self
            .request(["start", name])
            .timeout(self.run_timeout)
            .stream_as("docker start");
        self.invoke_checked(req, name).map(|_| ())
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        let req = self
            .request(["restart", name])
            .timeout(self.run_timeout)
            .stream_as("docker restart");
        self.invoke_checked(req, name).map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let req = self
            .request(["stop", name])
            .timeout(self.run_timeout)
            .stream_as("docker stop");
        self.invoke_checked(req, name).map(|_| ())
    }

    fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        let req = self
            .request(["rm", "-f", name])
            .timeout(self.run_timeout)
            .stream_as("docker rm");
        self.invoke_checked(req, name).map(|_| ())
    }

    fn build(&self, spec: &BuildSpec) -> Result<(), RuntimeError> {
        let mut args: Vec<String> = vec![
            "build".to_string(),
            "-t".to_string(),
            spec.tag.clone(),
            "-f".to_string(),
            spec.dockerfile.display().to_string(),
        ];
        for (k, v) in &spec.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push(spec.context.display().to_string());
        let req = self
            .request(args)
            .timeout(self.build_timeout)
            .stream_as("docker build");
        self.invoke_checked(req, &spec.tag).map(|_| ())
    }

    fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];
        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{k}={v}"));
        }
        args.push("-p".to_string());
        args.push(format!("127.0.0.1:{}:{}", spec.host_port, spec.container_port));
        args.push("-v".to_string());
        args.push(format!("{}:{}", spec.host_dir.display(), spec.container_dir));
        args.push("-w".to_string());
        args.push(spec.container_dir.clone());
        args.push(spec.image.clone());
        let req = self
            .request(args)
            .timeout(self.run_timeout)
            .stream_as("docker run");
        self.invoke_checked(req, &spec.name).map(|_| ())
    }

    fn exec(
        &self,
        name: &str,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecResult, RuntimeError> {
        let mut args: Vec<String> = vec!["exec".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        // Leading `--user <u>` in `command` is an exec option, not part of the command.
        let mut rest = command;
        if command.len() >= 2 && command[0] == "--user" {
            args.push("--user".to_string());
            args.push(command[1].clone());
            rest = &command[2..];
        }
        args.push(name.to_string());
        args.extend(rest.iter().cloned());
        let mut req = self
            .request(args)
            .timeout(self.exec_timeout)
            .stream_quiet("docker exec");
        if let Some(data) = stdin {
            req = req.stdin(data.to_vec());
        }
        let out = self.invoke(req)?;
        if !out.success() && looks_not_found(&out.stderr) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok(ExecResult {
            code: out.code(),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::diagnostics::MemorySink;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_DOCKER: &str = r#"#!/bin/sh
case "$1" in
  port)
    case "$2" in
      gone) echo "Error: No such container: gone" >&2; exit 1 ;;
      bare) echo "Error: No public port '22/tcp' published for bare" >&2; exit 1 ;;
      up) echo "127.0.0.1:40022"; exit 0 ;;
      *) echo "Cannot connect to the Docker daemon at unix:///var/run/docker.sock" >&2; exit 1 ;;
    esac ;;
  container) echo "true"; exit 0 ;;
  exec) echo "vscode"; exit 0 ;;
esac
exit 2
"#;

    fn fake_cli(dir: &std::path::Path, sink: Arc<MemorySink>) -> DockerCli {
        let path = dir.join("docker");
        std::fs::write(&path, FAKE_DOCKER).expect("write fake docker");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        DockerCli::with_runtime(path, sink, &Settings::default())
    }

    #[test]
    fn test_mapped_port_separates_absent_from_engine_failure() {
        let td = tempfile::tempdir().expect("tmpdir");
        let cli = fake_cli(td.path(), Arc::new(MemorySink::new()));
        assert_eq!(cli.mapped_port("up").expect("up"), Some(40022));
        assert_eq!(cli.mapped_port("gone").expect("gone"), None);
        assert_eq!(cli.mapped_port("bare").expect("bare"), None);
        let err = cli.mapped_port("daemon-down").expect_err("engine failure");
        assert!(matches!(err, RuntimeError::Engine { .. }), "{err:?}");
    }

    #[test]
    fn test_queries_and_execs_reach_the_sink() {
        let td = tempfile::tempdir().expect("tmpdir");
        let sink = Arc::new(MemorySink::new());
        let cli = fake_cli(td.path(), sink.clone());
        assert!(cli.is_running("ws").expect("inspect"));
        let out = cli
            .exec("ws", &["id".to_string(), "-un".to_string()], None)
            .expect("exec");
        assert_eq!(out.stdout.trim(), "vscode");
        assert!(sink.contains("[docker inspect] true"));
        assert!(sink.contains("[docker exec] vscode"));
    }
}
