#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use codium_devcontainer as cdc;
use cdc::decision::{Choice, DecisionPoint, DecisionProvider};
use cdc::docker::{BuildSpec, ContainerRuntime, ExecResult, RunSpec};
use cdc::errors::RuntimeError;
use cdc::ssh::{LoginAttempt, LoginProbe};
use cdc::supervisor::{ConnectionProbe, Daemon};

/// Observable container state behind `FakeRuntime`.
#[derive(Debug, Clone, Default)]
pub struct FakeState {
    pub exists: bool,
    pub running: bool,
    pub created: Option<SystemTime>,
    pub port: Option<u16>,
    pub start_fails: bool,
    pub restart_fails: bool,
    pub build_fails: bool,
    /// `run` creates the container without a published port.
    pub run_without_port: bool,
}

/// In-memory container engine that records every call.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
    builds: Mutex<Vec<BuildSpec>>,
    runs: Mutex<Vec<RunSpec>>,
    execs: Mutex<Vec<(Vec<String>, Option<Vec<u8>>)>>,
    replies: Mutex<Vec<(String, ExecResult)>>,
    snapshots: Mutex<Vec<BuildSnapshot>>,
}

/// What the build context looked like when `build` ran.
#[derive(Debug, Clone)]
pub struct BuildSnapshot {
    pub dockerfile: String,
    pub supervisor_staged: bool,
}

pub fn ok_output(stdout: &str) -> ExecResult {
    ExecResult {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn engine_error(command: &str) -> RuntimeError {
    RuntimeError::Engine {
        command: command.to_string(),
        status: Some(1),
        output: format!("Error response from daemon: {command} failed"),
    }
}

impl FakeRuntime {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn running(port: u16, created: SystemTime) -> Self {
        let rt = Self::default();
        rt.set(|s| {
            s.exists = true;
            s.running = true;
            s.port = Some(port);
            s.created = Some(created);
        });
        rt
    }

    pub fn stopped(port: u16, created: SystemTime) -> Self {
        let rt = Self::running(port, created);
        rt.set(|s| s.running = false);
        rt
    }

    pub fn set(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().expect("state"));
    }

    pub fn state(&self) -> FakeState {
        self.state.lock().expect("state").clone()
    }

    /// Reply for any exec whose joined argv contains `needle`; first match wins.
    pub fn reply(&self, needle: &str, result: ExecResult) {
        self.replies
            .lock()
            .expect("replies")
            .push((needle.to_string(), result));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    pub fn builds(&self) -> Vec<BuildSpec> {
        self.builds.lock().expect("builds").clone()
    }

    pub fn runs(&self) -> Vec<RunSpec> {
        self.runs.lock().expect("runs").clone()
    }

    pub fn snapshots(&self) -> Vec<BuildSnapshot> {
        self.snapshots.lock().expect("snapshots").clone()
    }

    pub fn execs(&self) -> Vec<(Vec<String>, Option<Vec<u8>>)> {
        self.execs.lock().expect("execs").clone()
    }

    fn record(&self, op: &str) {
        self.calls.lock().expect("calls").push(op.to_string());
    }
}

impl ContainerRuntime for FakeRuntime {
    fn exists(&self, _name: &str) -> Result<bool, RuntimeError> {
        self.record("exists");
        Ok(self.state().exists)
    }

    fn is_running(&self, _name: &str) -> Result<bool, RuntimeError> {
        self.record("is_running");
        let s = self.state();
        Ok(s.exists && s.running)
    }

    fn created_at(&self, _name: &str) -> Result<Option<SystemTime>, RuntimeError> {
        self.record("created_at");
        let s = self.state();
        Ok(if s.exists { s.created } else { None })
    }

    fn mapped_port(&self, _name: &str) -> Result<Option<u16>, RuntimeError> {
        self.record("mapped_port");
        let s = self.state();
        Ok(if s.exists && s.running { s.port } else { None })
    }

    fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("start");
        let mut s = self.state.lock().expect("state");
        if !s.exists {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        if s.start_fails {
            return Err(engine_error("docker start"));
        }
        s.running = true;
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("restart");
        let mut s = self.state.lock().expect("state");
        if !s.exists {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        if s.restart_fails {
            return Err(engine_error("docker restart"));
        }
        s.running = true;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("stop");
        let mut s = self.state.lock().expect("state");
        if !s.exists {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        s.running = false;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("remove");
        let mut s = self.state.lock().expect("state");
        if !s.exists {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        s.exists = false;
        s.running = false;
        s.port = None;
        s.created = None;
        Ok(())
    }

    fn build(&self, spec: &BuildSpec) -> Result<(), RuntimeError> {
        self.record("build");
        self.builds.lock().expect("builds").push(spec.clone());
        self.snapshots.lock().expect("snapshots").push(BuildSnapshot {
            dockerfile: std::fs::read_to_string(&spec.dockerfile).unwrap_or_default(),
            supervisor_staged: spec
                .context
                .join(cdc::pipeline::staging::SUPERVISOR_FILE)
                .is_file(),
        });
        if self.state().build_fails {
            return Err(engine_error("docker build"));
        }
        Ok(())
    }

    fn run(&self, spec: &RunSpec) -> Result<(), RuntimeError> {
        self.record("run");
        self.runs.lock().expect("runs").push(spec.clone());
        let mut s = self.state.lock().expect("state");
        if s.exists {
            return Err(engine_error("docker run (name conflict)"));
        }
        s.exists = true;
        s.running = true;
        s.created = Some(SystemTime::now());
        s.port = (!s.run_without_port).then_some(spec.host_port);
        Ok(())
    }

    fn exec(
        &self,
        _name: &str,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecResult, RuntimeError> {
        self.record("exec");
        self.execs
            .lock()
            .expect("execs")
            .push((command.to_vec(), stdin.map(<[u8]>::to_vec)));
        let joined = command.join(" ");
        let reply = self
            .replies
            .lock()
            .expect("replies")
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, r)| r.clone());
        Ok(reply.unwrap_or_else(|| ok_output("")))
    }
}

/// Decision provider answering from a script; an exhausted script dismisses the prompt.
#[derive(Default)]
pub struct ScriptedDecisions {
    answers: Mutex<VecDeque<Option<Choice>>>,
    asked: Mutex<Vec<DecisionPoint>>,
    key: Option<PathBuf>,
    key_requests: Mutex<usize>,
}

impl ScriptedDecisions {
    pub fn new(answers: &[Option<Choice>]) -> Self {
        ScriptedDecisions {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<PathBuf>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn asked(&self) -> Vec<DecisionPoint> {
        self.asked.lock().expect("asked").clone()
    }

    pub fn key_requests(&self) -> usize {
        *self.key_requests.lock().expect("key requests")
    }
}

impl DecisionProvider for ScriptedDecisions {
    fn decide(&self, point: DecisionPoint, _container: &str) -> Option<Choice> {
        self.asked.lock().expect("asked").push(point);
        self.answers.lock().expect("answers").pop_front().flatten()
    }

    fn pick_public_key(&self, _searched: &[PathBuf]) -> Option<PathBuf> {
        *self.key_requests.lock().expect("key requests") += 1;
        self.key.clone()
    }
}

/// Login probe returning a fixed attempt and recording its arguments.
pub struct ScriptedLogin {
    attempt: LoginAttempt,
    calls: Mutex<Vec<(String, u16, Option<PathBuf>)>>,
}

impl ScriptedLogin {
    pub fn succeeding() -> Self {
        Self::with_stderr(true, "")
    }

    pub fn with_stderr(success: bool, stderr: &str) -> Self {
        ScriptedLogin {
            attempt: LoginAttempt {
                success,
                stderr: stderr.to_string(),
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, u16, Option<PathBuf>)> {
        self.calls.lock().expect("calls").clone()
    }
}

impl LoginProbe for ScriptedLogin {
    fn try_login(
        &self,
        user: &str,
        port: u16,
        identity: Option<&Path>,
    ) -> Result<LoginAttempt, RuntimeError> {
        self.calls.lock().expect("calls").push((
            user.to_string(),
            port,
            identity.map(Path::to_path_buf),
        ));
        Ok(self.attempt.clone())
    }
}

/// Connection probe replaying a script, then `fallback` forever.
pub struct ScriptedProbe {
    script: VecDeque<bool>,
    fallback: bool,
    pub polls: usize,
}

impl ScriptedProbe {
    pub fn idle() -> Self {
        Self::new(&[], false)
    }

    pub fn new(script: &[bool], fallback: bool) -> Self {
        ScriptedProbe {
            script: script.iter().copied().collect(),
            fallback,
            polls: 0,
        }
    }
}

impl ConnectionProbe for ScriptedProbe {
    fn has_established(&mut self) -> bool {
        self.polls += 1;
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Daemon that stays alive for `alive_checks` liveness checks (forever when `None`).
#[derive(Debug, Default)]
pub struct FakeDaemon {
    pub alive_checks: Option<u32>,
    pub checks: u32,
    pub terminated: bool,
}

impl FakeDaemon {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn dying_after(checks: u32) -> Self {
        FakeDaemon {
            alive_checks: Some(checks),
            ..Default::default()
        }
    }
}

impl Daemon for FakeDaemon {
    fn is_alive(&mut self) -> bool {
        self.checks += 1;
        !self.terminated && self.alive_checks.map(|n| self.checks <= n).unwrap_or(true)
    }

    fn exit_code(&mut self) -> Option<i32> {
        Some(255)
    }

    fn terminate(&mut self, _grace: Duration) -> std::io::Result<()> {
        self.terminated = true;
        Ok(())
    }
}

/// A project folder with an optional `.devcontainer/devcontainer.json` and a fake
/// supervisor binary to stage.
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub project: PathBuf,
    pub supervisor: PathBuf,
}

impl Workspace {
    pub fn new(name: &str, devcontainer_json: Option<&str>) -> Self {
        let dir = tempfile::tempdir().expect("tmpdir");
        let project = dir.path().join(name);
        std::fs::create_dir_all(&project).expect("mkdir project");
        if let Some(json) = devcontainer_json {
            let cfg_dir = project.join(".devcontainer");
            std::fs::create_dir_all(&cfg_dir).expect("mkdir .devcontainer");
            std::fs::write(cfg_dir.join("devcontainer.json"), json).expect("write config");
        }
        let supervisor = dir.path().join("supervisor-bin");
        std::fs::write(&supervisor, b"#!/bin/sh\n").expect("write supervisor");
        Workspace {
            dir,
            project,
            supervisor,
        }
    }

    pub fn session(&self) -> cdc::Session {
        cdc::Session::load(&self.project, &cdc::Settings::default()).expect("session")
    }
}

pub fn fixed_port() -> u16 {
    40022
}

pub fn an_hour_ago() -> SystemTime {
    SystemTime::now() - Duration::from_secs(3600)
}
