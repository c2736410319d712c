use std::path::Path;
use std::process::{Command, Stdio};

use codium_devcontainer::{color_enabled_stderr, paint, Session, Settings};

fn value(use_color: bool, s: &str) -> String {
    paint(use_color, "\x1b[34;1m", s)
}

fn first_line(program: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .ok()?;
    // ssh -V prints to stderr
    let text = if out.stdout.is_empty() {
        out.stderr
    } else {
        out.stdout
    };
    String::from_utf8_lossy(&text)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

pub fn run_doctor(project: &Path, verbose: bool) {
    let use_err = color_enabled_stderr();
    let settings = Settings::from_env();
    eprintln!("codium-devcontainer doctor");
    eprintln!();
    eprintln!("  version: v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if verbose {
        eprintln!(
            "  build:   {} {} ({}, {})",
            env!("CODIUM_DEVCONTAINER_BUILD_TARGET"),
            env!("CODIUM_DEVCONTAINER_BUILD_PROFILE"),
            env!("CODIUM_DEVCONTAINER_BUILD_RUSTC"),
            env!("CODIUM_DEVCONTAINER_BUILD_DATE"),
        );
    }
    eprintln!();

    match codium_devcontainer::container_runtime_path() {
        Ok(p) => {
            eprintln!("  docker:  {}", value(use_err, &p.display().to_string()));
            if let Some(v) = first_line(&p, &["--version"]) {
                eprintln!("  docker --version: {v}");
            }
        }
        Err(e) => eprintln!("  docker:  not found ({e})"),
    }
    match codium_devcontainer::docker::ssh_client_path() {
        Ok(p) => {
            eprintln!("  ssh:     {}", value(use_err, &p.display().to_string()));
            if let Some(v) = first_line(&p, &["-V"]) {
                eprintln!("  ssh -V:  {v}");
            }
        }
        Err(e) => eprintln!("  ssh:     not found ({e})"),
    }

    let keys: Vec<String> = home::home_dir()
        .map(|h| {
            codium_devcontainer::ssh::KEY_CANDIDATES
                .iter()
                .map(|k| h.join(".ssh").join(k))
                .filter(|p| p.is_file())
                .map(|p| p.display().to_string())
                .collect()
        })
        .unwrap_or_default();
    if keys.is_empty() {
        eprintln!("  public key: none (you will be asked for one)");
    } else {
        eprintln!("  public key: {}", value(use_err, &keys.join(", ")));
    }
    if let Some(cfg) = settings.ssh_config_path() {
        eprintln!("  ssh config: {}", cfg.display());
    }
    let supervisor = settings
        .supervisor_bin
        .clone()
        .or_else(codium_devcontainer::pipeline::staging::default_supervisor_source);
    match supervisor {
        Some(p) => eprintln!("  supervisor: {}", value(use_err, &p.display().to_string())),
        None => eprintln!(
            "  supervisor: not found (set CODIUM_DEVCONTAINER_SUPERVISOR_BIN)"
        ),
    }
    eprintln!();

    match Session::load(project, &settings) {
        Ok(s) => {
            eprintln!("  workspace:  {}", s.project_dir.display());
            eprintln!("  container:  {}", value(use_err, &s.container_name));
            eprintln!("  base image: {}", s.base_image);
            eprintln!(
                "  config:     {}",
                s.config_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            );
            if let Some(fp) = s.config_fingerprint {
                eprintln!(
                    "  config mtime: {}",
                    humantime::format_rfc3339_seconds(fp)
                );
            }
            eprintln!(
                "  remote user: {}",
                s.remote_user.as_deref().unwrap_or("(resolved at runtime)")
            );
            eprintln!("  post-create steps: {}", s.post_create_steps.len());
        }
        Err(e) => eprintln!("  workspace:  error ({e})"),
    }
    eprintln!();
    eprintln!("doctor: completed diagnostics.");
}
