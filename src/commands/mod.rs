use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codium_devcontainer::decision::{Choice, DecisionProvider, FixedDecisions, TerminalDecisions};
use codium_devcontainer::pipeline::staging::default_supervisor_source;
use codium_devcontainer::ssh::{self, AccessReport, Bootstrap, HostBlock, OpenSsh};
use codium_devcontainer::{
    color_enabled_stderr, exit_code_for_reconcile_error, exit_code_for_runtime_error,
    log_error_stderr, log_info_stderr, log_warn_stderr, ContainerRuntime, DiagnosticSink,
    DockerCli, ReconcileError, Ready, Reconciler, RuntimeError, Session, SessionLock, Settings,
    StderrSink,
};

use crate::cli::{Cli, Policy};

/// How long `stop` waits for the supervisor to honor the stop marker.
const STOP_MARKER_WAIT: Duration = Duration::from_secs(10);

struct Context {
    settings: Settings,
    session: Session,
    sink: Arc<dyn DiagnosticSink>,
    runtime: Arc<DockerCli>,
}

fn fail(msg: &str, code: u8) -> ExitCode {
    log_error_stderr(color_enabled_stderr(), &format!("codium-devcontainer: {msg}"));
    ExitCode::from(code)
}

fn fail_reconcile(e: &ReconcileError) -> ExitCode {
    fail(&e.to_string(), exit_code_for_reconcile_error(e))
}

fn fail_runtime(e: &RuntimeError) -> ExitCode {
    fail(&e.to_string(), exit_code_for_runtime_error(e))
}

fn prepare(cli: &Cli) -> Result<Context, ExitCode> {
    let mut settings = Settings::from_env();
    settings.verbose |= cli.verbose;
    let project = cli
        .project
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let session = Session::load(&project, &settings).map_err(|e| fail(&e, 1))?;
    tracing::debug!(slug = %session.slug, project = %session.project_dir.display(), "session resolved");
    let sink: Arc<dyn DiagnosticSink> = Arc::new(StderrSink::new(settings.verbose));
    let runtime = DockerCli::new(Arc::clone(&sink), &settings).map_err(|e| fail_runtime(&e))?;
    Ok(Context {
        settings,
        session,
        sink,
        runtime: Arc::new(runtime),
    })
}

fn decisions_for(policy: Policy) -> Box<dyn DecisionProvider> {
    match policy {
        Policy::Prompt => Box::new(TerminalDecisions),
        Policy::Rebuild => Box::new(FixedDecisions(Choice::Rebuild)),
        Policy::Reuse => Box::new(FixedDecisions(Choice::Reuse)),
    }
}

fn session_lock(ctx: &Context) -> Result<SessionLock, ExitCode> {
    codium_devcontainer::acquire_session_lock(&ctx.session.slug).map_err(|e| fail_reconcile(&e))
}

/// Result of bringing a workspace up: where to connect and as whom.
struct Connection {
    ready: Ready,
    user: String,
    access: Option<AccessReport>,
}

fn bring_up(ctx: &Context, rebuild: bool, policy: Policy) -> Result<Connection, ExitCode> {
    let use_err = color_enabled_stderr();
    // A leftover marker would make the supervisor exit right after start.
    clear_stop_marker(&ctx.session.stop_marker_path());
    let decisions = decisions_for(policy);
    let supervisor_source = ctx
        .settings
        .supervisor_bin
        .clone()
        .or_else(default_supervisor_source);

    let ready = Reconciler::new(ctx.runtime.as_ref(), decisions.as_ref(), ctx.sink.as_ref())
        .with_supervisor_source(supervisor_source)
        .ensure_ready(&ctx.session, rebuild)
        .map_err(|e| fail_reconcile(&e))?;
    let action = if ready.rebuilt { "rebuilt" } else { "reused" };
    log_info_stderr(
        use_err,
        &format!(
            "codium-devcontainer: {} {} on 127.0.0.1:{}",
            action, ready.container_name, ready.port
        ),
    );

    let user = match codium_devcontainer::resolve_effective_user(
        ctx.runtime.as_ref(),
        &ready.container_name,
        ctx.session.remote_user.as_deref(),
    ) {
        Ok(u) => {
            if let Some(notice) = &u.notice {
                log_warn_stderr(use_err, &format!("codium-devcontainer: {notice}"));
            }
            u.name
        }
        Err(e) => {
            log_warn_stderr(
                use_err,
                &format!("codium-devcontainer: could not resolve the remote user ({e}); using root"),
            );
            "root".to_string()
        }
    };

    let access = match OpenSsh::new(Arc::clone(&ctx.sink), ctx.settings.ssh_timeout) {
        Ok(probe) => {
            let report = Bootstrap::new(
                ctx.runtime.as_ref(),
                decisions.as_ref(),
                &probe,
                ctx.sink.as_ref(),
            )
            .setup_access_report(&ready.container_name, &user, ready.port);
            if !report.ok {
                log_warn_stderr(
                    use_err,
                    &ssh::manual_instructions(&ready.container_name, &user, ready.port),
                );
            }
            Some(report)
        }
        Err(e) => {
            log_warn_stderr(
                use_err,
                &format!("codium-devcontainer: skipping SSH setup: {e}"),
            );
            None
        }
    };

    write_host_entry(ctx, &user, ready.port, access.as_ref());
    Ok(Connection {
        ready,
        user,
        access,
    })
}

fn write_host_entry(ctx: &Context, user: &str, port: u16, access: Option<&AccessReport>) {
    let Some(config) = ctx.settings.ssh_config_path() else {
        return;
    };
    let block = HostBlock {
        alias: ctx.session.slug.clone(),
        port,
        user: user.to_string(),
        identity_file: access.and_then(|a| a.identity_file.clone()),
    };
    if let Err(e) = ssh::upsert_host_block(&config, &block) {
        log_warn_stderr(
            color_enabled_stderr(),
            &format!(
                "codium-devcontainer: could not update {}: {e}",
                config.display()
            ),
        );
    }
}

fn remove_host_entry(settings: &Settings, alias: &str) {
    let Some(config) = settings.ssh_config_path() else {
        return;
    };
    if let Err(e) = ssh::remove_host_block(&config, alias) {
        log_warn_stderr(
            color_enabled_stderr(),
            &format!(
                "codium-devcontainer: could not update {}: {e}",
                config.display()
            ),
        );
    }
}

fn remove_container(runtime: &DockerCli, name: &str) -> Result<(), RuntimeError> {
    match runtime.remove(name) {
        Err(RuntimeError::NotFound(_)) => Ok(()),
        other => other,
    }
}

/// Ask the supervisor to stop after an interactive session closed.
fn request_stop(runtime: &DockerCli, name: &str, marker: &Path) {
    if !runtime.is_running(name).unwrap_or(false) {
        return;
    }
    match std::fs::write(marker, b"stop\n") {
        Ok(()) => tracing::info!(container = name, "stop requested"),
        Err(e) => tracing::warn!(error = %e, path = %marker.display(), "could not write stop marker"),
    }
}

fn clear_stop_marker(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

pub fn run_up(cli: &Cli, rebuild: bool, policy: Policy) -> ExitCode {
    let ctx = match prepare(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let lock = match session_lock(&ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let conn = match bring_up(&ctx, rebuild, policy) {
        Ok(c) => c,
        Err(code) => return code,
    };
    drop(lock);

    // stdout: machine-readable (no colors)
    println!("port {}", conn.ready.port);
    println!("ssh {}", ctx.session.slug);
    let verified = conn.access.as_ref().map(|a| a.ok).unwrap_or(false);
    tracing::info!(user = %conn.user, verified, "up completed");
    ExitCode::from(0)
}

pub fn run_shell(cli: &Cli, rebuild: bool, policy: Policy, remove_on_exit: bool) -> ExitCode {
    let ctx = match prepare(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let lock = match session_lock(&ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let conn = match bring_up(&ctx, rebuild, policy) {
        Ok(c) => c,
        Err(code) => return code,
    };
    // Other invocations may reconcile while this session is open.
    drop(lock);

    let client = match OpenSsh::new(Arc::clone(&ctx.sink), ctx.settings.ssh_timeout) {
        Ok(c) => c,
        Err(e) => return fail_runtime(&e),
    };
    let identity = conn.access.as_ref().and_then(|a| a.identity_file.clone());
    let mut handle = match client.open_interactive(&conn.user, conn.ready.port, identity.as_deref())
    {
        Ok(h) => h,
        Err(e) => {
            return fail(
                &format!("failed to start ssh: {e}"),
                codium_devcontainer::exit_code_for_io_error(&e),
            )
        }
    };

    let runtime = Arc::clone(&ctx.runtime);
    let name = conn.ready.container_name.clone();
    let marker = ctx.session.stop_marker_path();
    if remove_on_exit {
        let settings = ctx.settings.clone();
        let slug = ctx.session.slug.clone();
        handle.on_closed(move |_| {
            let use_err = color_enabled_stderr();
            let _lock = match codium_devcontainer::acquire_session_lock(&slug) {
                Ok(l) => l,
                Err(e) => {
                    log_warn_stderr(
                        use_err,
                        &format!("codium-devcontainer: not removing {name}: {e}"),
                    );
                    return;
                }
            };
            match remove_container(&runtime, &name) {
                Ok(()) => {
                    remove_host_entry(&settings, &slug);
                    clear_stop_marker(&marker);
                    log_info_stderr(use_err, &format!("codium-devcontainer: removed {name}"));
                }
                Err(e) => log_error_stderr(
                    use_err,
                    &format!("codium-devcontainer: failed to remove {name}: {e}"),
                ),
            }
        });
    } else {
        handle.on_closed(move |_| request_stop(&runtime, &name, &marker));
    }

    match handle.wait() {
        Ok(status) => ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8),
        Err(e) => fail(
            &format!("ssh session failed: {e}"),
            codium_devcontainer::exit_code_for_io_error(&e),
        ),
    }
}

pub fn run_stop(cli: &Cli) -> ExitCode {
    let ctx = match prepare(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let _lock = match session_lock(&ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let use_err = color_enabled_stderr();
    let name = ctx.session.container_name.as_str();
    let running = match ctx.runtime.is_running(name) {
        Ok(r) => r,
        Err(e) => return fail_runtime(&e),
    };
    if !running {
        log_info_stderr(use_err, &format!("codium-devcontainer: {name} is not running"));
        return ExitCode::from(0);
    }

    // A marker left behind would stop the next start immediately, so it is only written
    // for a running supervisor and always cleared afterwards.
    let marker = ctx.session.stop_marker_path();
    let requested = std::fs::write(&marker, b"stop\n").is_ok();
    if requested {
        let deadline = Instant::now() + STOP_MARKER_WAIT;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(500));
            if !ctx.runtime.is_running(name).unwrap_or(true) {
                clear_stop_marker(&marker);
                log_info_stderr(use_err, &format!("codium-devcontainer: stopped {name}"));
                return ExitCode::from(0);
            }
        }
        ctx.sink.note("supervisor did not react to the stop request; stopping the container");
    }
    let result = ctx.runtime.stop(name);
    clear_stop_marker(&marker);
    match result {
        Ok(()) | Err(RuntimeError::NotFound(_)) => {
            log_info_stderr(use_err, &format!("codium-devcontainer: stopped {name}"));
            ExitCode::from(0)
        }
        Err(e) => fail_runtime(&e),
    }
}

pub fn run_down(cli: &Cli) -> ExitCode {
    let ctx = match prepare(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let _lock = match session_lock(&ctx) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let name = ctx.session.container_name.as_str();
    if let Err(e) = remove_container(&ctx.runtime, name) {
        return fail_runtime(&e);
    }
    remove_host_entry(&ctx.settings, &ctx.session.slug);
    clear_stop_marker(&ctx.session.stop_marker_path());
    log_info_stderr(
        color_enabled_stderr(),
        &format!("codium-devcontainer: removed {name}"),
    );
    ExitCode::from(0)
}

pub fn run_status(cli: &Cli) -> ExitCode {
    let ctx = match prepare(cli) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let name = ctx.session.container_name.as_str();
    let rt = ctx.runtime.as_ref();
    let state = match (rt.exists(name), rt.is_running(name)) {
        (Ok(false), _) => "absent",
        (Ok(true), Ok(true)) => "running",
        (Ok(true), Ok(false)) => "stopped",
        (Err(e), _) | (_, Err(e)) => return fail_runtime(&e),
    };

    // stdout: key/value lines
    println!("workspace {}", ctx.session.project_dir.display());
    println!("slug {}", ctx.session.slug);
    println!("container {name}");
    println!("image {}", ctx.session.image_name);
    println!("base-image {}", ctx.session.base_image);
    println!("state {state}");
    if state == "running" {
        match rt.mapped_port(name) {
            Ok(Some(port)) => println!("port {port}"),
            Ok(None) => println!("port none"),
            Err(e) => return fail_runtime(&e),
        }
    }
    if state != "absent" {
        let created = match rt.created_at(name) {
            Ok(c) => c,
            Err(e) => return fail_runtime(&e),
        };
        if let Some(created) = created {
            println!("created {}", humantime::format_rfc3339_seconds(created));
            if let Some(fp) = ctx.session.config_fingerprint {
                println!("config-stale {}", fp > created);
            }
        }
    }
    ExitCode::from(0)
}
