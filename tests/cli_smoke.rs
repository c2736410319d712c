use std::process::Command;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_codium-devcontainer"));
    cmd.env("CODIUM_DEVCONTAINER_SKIP_DOCKER", "1")
        .env("NO_COLOR", "1")
        .env_remove("CODIUM_DEVCONTAINER_TRACING_FMT");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let out = bin().arg("--help").output().expect("run");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for sub in ["up", "shell", "stop", "down", "status", "doctor"] {
        assert!(text.contains(sub), "missing {sub} in help:\n{text}");
    }
}

#[test]
fn test_missing_runtime_exits_127() {
    let td = tempfile::tempdir().expect("tmpdir");
    let out = bin()
        .args(["--project", &td.path().display().to_string(), "status"])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(127));
    assert!(out.stdout.is_empty());
}

#[test]
fn test_doctor_runs_without_runtime() {
    let td = tempfile::tempdir().expect("tmpdir");
    let out = bin()
        .args(["--project", &td.path().display().to_string(), "doctor"])
        .output()
        .expect("run");
    assert_eq!(out.status.code(), Some(0));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("codium-devcontainer doctor"));
    assert!(err.contains("docker:  not found"));
}

#[test]
fn test_supervisor_reports_version() {
    let out = Command::new(env!("CARGO_BIN_EXE_codium-devcontainer-supervisor"))
        .arg("--version")
        .output()
        .expect("run");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));
}
