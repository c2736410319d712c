mod common;

use std::fs;

use codium_devcontainer as cdc;
use cdc::ssh::{AccessReport, Bootstrap, LoginFailure};
use cdc::MemorySink;
use common::{ok_output, FakeRuntime, ScriptedDecisions, ScriptedLogin};

const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIExample me@laptop";

fn key_dir(with_private: bool) -> tempfile::TempDir {
    let td = tempfile::tempdir().expect("tmpdir");
    fs::write(td.path().join("id_ed25519.pub"), format!("{KEY}\n")).expect("pub");
    if with_private {
        fs::write(td.path().join("id_ed25519"), "private").expect("priv");
    }
    td
}

fn run(
    rt: &FakeRuntime,
    dec: &ScriptedDecisions,
    login: &ScriptedLogin,
    ssh_dir: &std::path::Path,
) -> AccessReport {
    let sink = MemorySink::new();
    Bootstrap::new(rt, dec, login, &sink)
        .with_ssh_dir(ssh_dir)
        .setup_access_report("codium-devcontainer-demo", "vscode", 40022)
}

#[test]
fn test_key_installed_as_root_into_resolved_home_and_login_verified() {
    let keys = key_dir(true);
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    rt.reply("eval echo ~vscode", ok_output("/home/vscode\n"));
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::succeeding();

    let report = run(&rt, &dec, &login, keys.path());
    assert!(report.ok);
    assert_eq!(report.failure, None);
    assert_eq!(report.public_key, Some(keys.path().join("id_ed25519.pub")));
    assert_eq!(report.identity_file, Some(keys.path().join("id_ed25519")));
    assert_eq!(dec.key_requests(), 0);

    let execs = rt.execs();
    let (argv, stdin) = execs
        .iter()
        .find(|(argv, _)| argv.join(" ").contains("authorized_keys"))
        .expect("install exec");
    assert_eq!(&argv[..2], ["--user", "root"]);
    let script = argv.last().expect("script");
    assert!(script.contains("grep -qxF"));
    assert!(script.contains("/home/vscode/.ssh/authorized_keys"));
    assert!(script.contains("chown -R vscode"));
    // The key travels on stdin, never on the command line.
    assert!(!script.contains("AAAAC3Nza"));
    assert_eq!(stdin.as_deref(), Some(format!("{KEY}\n").as_bytes()));

    assert_eq!(
        login.calls(),
        vec![(
            "vscode".to_string(),
            40022,
            Some(keys.path().join("id_ed25519"))
        )]
    );
}

#[test]
fn test_unexpanded_home_falls_back_to_conventional_path() {
    let keys = key_dir(false);
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    rt.reply("eval echo", ok_output("~vscode\n"));
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::succeeding();

    let report = run(&rt, &dec, &login, keys.path());
    assert!(report.ok);
    assert_eq!(report.identity_file, None);
    assert!(rt
        .execs()
        .iter()
        .any(|(argv, _)| argv.join(" ").contains("/home/vscode/.ssh/authorized_keys")));
    assert_eq!(login.calls()[0].2, None);
}

#[test]
fn test_rsa_key_used_when_no_ed25519() {
    let td = tempfile::tempdir().expect("tmpdir");
    fs::write(td.path().join("id_rsa.pub"), "ssh-rsa AAAAB3 me\n").expect("pub");
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::succeeding();

    let report = run(&rt, &dec, &login, td.path());
    assert_eq!(report.public_key, Some(td.path().join("id_rsa.pub")));
    assert_eq!(dec.key_requests(), 0);
}

#[test]
fn test_missing_keys_ask_for_one() {
    let empty = tempfile::tempdir().expect("tmpdir");
    let picked = key_dir(false);
    let chosen = picked.path().join("id_ed25519.pub");
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    let dec = ScriptedDecisions::new(&[]).with_key(&chosen);
    let login = ScriptedLogin::succeeding();

    let report = run(&rt, &dec, &login, empty.path());
    assert_eq!(dec.key_requests(), 1);
    assert_eq!(report.public_key, Some(chosen));
    assert!(rt.execs().iter().any(|(_, stdin)| stdin.is_some()));
}

#[test]
fn test_declined_key_pick_still_checks_login() {
    let empty = tempfile::tempdir().expect("tmpdir");
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::with_stderr(false, "vscode@127.0.0.1: Permission denied (publickey).");

    let report = run(&rt, &dec, &login, empty.path());
    assert!(!report.ok);
    assert_eq!(report.public_key, None);
    assert_eq!(report.failure, Some(LoginFailure::AuthBlocked));
    assert!(rt.execs().is_empty());
    assert_eq!(login.calls().len(), 1);
}

#[test]
fn test_local_config_problem_is_distinguished() {
    let keys = key_dir(true);
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::with_stderr(
        false,
        "/home/me/.ssh/config: line 7: Bad configuration option: usekeychain\n",
    );
    let sink = MemorySink::new();

    let ok = Bootstrap::new(&rt, &dec, &login, &sink)
        .with_ssh_dir(keys.path())
        .setup_access("codium-devcontainer-demo", "vscode", 40022);
    assert!(!ok);
    assert!(sink.contains("local client configuration"));
}

#[test]
fn test_failed_install_is_reported_not_raised() {
    let keys = key_dir(true);
    let rt = FakeRuntime::running(40022, std::time::SystemTime::now());
    rt.reply(
        "authorized_keys",
        cdc::docker::ExecResult {
            code: Some(1),
            stdout: String::new(),
            stderr: "read-only file system".to_string(),
        },
    );
    let dec = ScriptedDecisions::new(&[]);
    let login = ScriptedLogin::with_stderr(false, "Permission denied (publickey).");
    let sink = MemorySink::new();

    let report = Bootstrap::new(&rt, &dec, &login, &sink)
        .with_ssh_dir(keys.path())
        .setup_access_report("codium-devcontainer-demo", "vscode", 40022);
    assert!(!report.ok);
    assert!(sink.contains("read-only file system"));
}
