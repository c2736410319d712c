#![allow(clippy::module_name_repetitions)]
//! Session reconciliation: decide reuse / rebuild / create and return a live SSH port.
//!
//! Observed container states are `absent`, `stopped` and `running`; they are always
//! queried from the engine, never assumed.

mod user;

use std::path::PathBuf;

use crate::decision::{Choice, DecisionPoint, DecisionProvider};
use crate::diagnostics::DiagnosticSink;
use crate::docker::{ContainerRuntime, RunSpec, CONTAINER_SSH_PORT};
use crate::errors::{ReconcileError, RuntimeError};
use crate::pipeline::BuildPipeline;
use crate::session::Session;

pub use user::{
    first_home_dir, parse_uid_min, pick_account, resolve_effective_user, EffectiveUser,
    DEFAULT_UID_MIN,
};

/// Outcome of `ensure_ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pub port: u16,
    pub container_name: String,
    /// True when this call built the image and replaced the container.
    pub rebuilt: bool,
}

/// Why a rebuild is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RebuildReason {
    Forced,
    Missing,
    StaleConfig,
    NoPort,
}

pub struct Reconciler<'a, R: ContainerRuntime + ?Sized, D: DecisionProvider + ?Sized> {
    runtime: &'a R,
    decisions: &'a D,
    sink: &'a dyn DiagnosticSink,
    supervisor_source: Option<PathBuf>,
    allocate_port: fn() -> u16,
}

impl<'a, R: ContainerRuntime + ?Sized, D: DecisionProvider + ?Sized> Reconciler<'a, R, D> {
    pub fn new(runtime: &'a R, decisions: &'a D, sink: &'a dyn DiagnosticSink) -> Self {
        Reconciler {
            runtime,
            decisions,
            sink,
            supervisor_source: None,
            allocate_port: crate::port::allocate_port,
        }
    }

    pub fn with_supervisor_source(mut self, source: Option<PathBuf>) -> Self {
        self.supervisor_source = source;
        self
    }

    pub fn with_port_allocator(mut self, allocate: fn() -> u16) -> Self {
        self.allocate_port = allocate;
        self
    }

    /// Converge `session` to a running, reachable container and return its SSH port.
    ///
    /// A dismissed decision aborts with `ReconcileError::Cancelled`; whatever the engine
    /// already did (e.g. a stopped container) stays as is.
    #[tracing::instrument(level = "info", skip_all, fields(container = %session.container_name, force_rebuild = force_rebuild))]
    pub fn ensure_ready(
        &self,
        session: &Session,
        force_rebuild: bool,
    ) -> Result<Ready, ReconcileError> {
        let name = session.container_name.as_str();
        let mut reason: Option<RebuildReason> = force_rebuild.then_some(RebuildReason::Forced);
        let mut port: Option<u16> = None;

        if !self.runtime.exists(name)? {
            tracing::info!("container absent");
            reason = reason.or(Some(RebuildReason::Missing));
        } else {
            if reason.is_none() && self.config_is_newer(session)? {
                match self.ask(DecisionPoint::StaleConfig, name)? {
                    Choice::Rebuild => reason = Some(RebuildReason::StaleConfig),
                    Choice::Reuse => {
                        tracing::info!("stale config, operator chose reuse");
                    }
                }
            }

            let was_running = self.runtime.is_running(name)?;
            if !was_running {
                self.ensure_started(name)?;
            }
            port = self.runtime.mapped_port(name)?;
            if port.is_none() && reason.is_none() {
                self.sink
                    .note(&format!("no SSH port mapping found for {name}; rebuilding"));
                reason = Some(RebuildReason::NoPort);
            }

            // An explicit rebuild request is already a confirmation.
            if was_running && !matches!(reason, None | Some(RebuildReason::Forced)) {
                if let Choice::Reuse = self.ask(DecisionPoint::RebuildRunning, name)? {
                    if port.is_some() {
                        tracing::info!(?reason, "rebuild withdrawn, reusing running container");
                        reason = None;
                    }
                }
            }
        }

        let Some(reason) = reason else {
            let port = port.ok_or_else(|| {
                ReconcileError::Config(format!("no SSH port mapping found for {name}"))
            })?;
            tracing::info!(port, "reusing container");
            return Ok(Ready {
                port,
                container_name: name.to_string(),
                rebuilt: false,
            });
        };

        tracing::info!(?reason, "rebuilding");
        let host_port = port.unwrap_or_else(self.allocate_port);
        BuildPipeline::new(self.runtime, self.sink, self.supervisor_source.clone())
            .build(session, &session.post_create_steps)?;
        self.replace_container(session, host_port)?;

        // Never trust the requested port: re-derive it from the new container.
        let port = self.runtime.mapped_port(name)?.ok_or_else(|| {
            ReconcileError::Config(format!(
                "{name} was started but publishes no SSH port; check `docker logs {name}`"
            ))
        })?;
        Ok(Ready {
            port,
            container_name: name.to_string(),
            rebuilt: true,
        })
    }

    fn ask(&self, point: DecisionPoint, name: &str) -> Result<Choice, ReconcileError> {
        self.decisions.decide(point, name).ok_or_else(|| {
            let (rebuild, reuse) = point.labels();
            ReconcileError::Cancelled(format!("no choice between '{rebuild}' and '{reuse}'"))
        })
    }

    fn config_is_newer(&self, session: &Session) -> Result<bool, ReconcileError> {
        let Some(fingerprint) = session.config_fingerprint else {
            return Ok(false);
        };
        let Some(created) = self.runtime.created_at(&session.container_name)? else {
            return Ok(false);
        };
        Ok(fingerprint > created)
    }

    /// Start; on failure try a restart. Engine refusals are soft here: the caller falls
    /// back to a rebuild when no port shows up.
    fn ensure_started(&self, name: &str) -> Result<(), ReconcileError> {
        match self.runtime.start(name) {
            Ok(()) => return Ok(()),
            Err(e @ (RuntimeError::Engine { .. } | RuntimeError::NotFound(_))) => {
                self.sink.note(&format!("start failed ({e}); trying restart"));
            }
            Err(e) => return Err(e.into()),
        }
        match self.runtime.restart(name) {
            Ok(()) => Ok(()),
            Err(e @ (RuntimeError::Engine { .. } | RuntimeError::NotFound(_))) => {
                self.sink.note(&format!("restart failed ({e})"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace_container(&self, session: &Session, host_port: u16) -> Result<(), ReconcileError> {
        let name = session.container_name.as_str();
        if self.runtime.is_running(name)? {
            tolerate_missing(self.runtime.stop(name))?;
        }
        tolerate_missing(self.runtime.remove(name))?;
        let spec = RunSpec {
            image: session.image_name.clone(),
            name: name.to_string(),
            env: vec![(
                crate::supervisor::ENV_WORKSPACE.to_string(),
                session.container_workspace.clone(),
            )],
            host_port,
            container_port: CONTAINER_SSH_PORT,
            host_dir: session.project_dir.clone(),
            container_dir: session.container_workspace.clone(),
        };
        self.runtime.run(&spec)?;
        tracing::info!(host_port, "container started");
        Ok(())
    }
}

fn tolerate_missing(r: Result<(), RuntimeError>) -> Result<(), RuntimeError> {
    match r {
        Err(RuntimeError::NotFound(_)) => Ok(()),
        other => other,
    }
}
