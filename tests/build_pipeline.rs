mod common;

use std::fs;

use codium_devcontainer as cdc;
use cdc::pipeline::dockerfile::{OWNERSHIP_MARKER, POST_CREATE_MARKER};
use cdc::pipeline::staging::{DOCKERFILE, SUPERVISOR_FILE, SUPERVISOR_STAMP};
use cdc::pipeline::BuildPipeline;
use cdc::MemorySink;
use common::{FakeRuntime, Workspace};

const CONFIG: &str = r#"{
    // JSONC is accepted
    "image": "mcr.microsoft.com/devcontainers/rust:1",
    "remoteUser": "vscode",
    "postCreateCommand": "cargo fetch && echo \"ready\"",
}"#;

#[test]
fn test_build_args_context_and_staged_files() {
    let ws = Workspace::new("Api Server", Some(CONFIG));
    let session = ws.session();
    assert_eq!(session.slug, "api-server");
    let rt = FakeRuntime::absent();
    let sink = MemorySink::new();

    BuildPipeline::new(&rt, &sink, Some(ws.supervisor.clone()))
        .build(&session, &session.post_create_steps)
        .expect("build");

    let spec = &rt.builds()[0];
    assert_eq!(spec.tag, "codium-devcontainer-api-server");
    assert_eq!(spec.context, session.config_dir);
    assert_eq!(spec.dockerfile, spec.context.join(DOCKERFILE));
    assert_eq!(
        spec.build_args,
        vec![
            (
                "BASE_IMAGE".to_string(),
                "mcr.microsoft.com/devcontainers/rust:1".to_string()
            ),
            ("USERNAME".to_string(), "vscode".to_string()),
        ]
    );

    let snap = &rt.snapshots()[0];
    assert!(snap.supervisor_staged);
    assert!(snap.dockerfile.starts_with(OWNERSHIP_MARKER));
    assert!(snap.dockerfile.contains(POST_CREATE_MARKER));
    assert!(snap
        .dockerfile
        .contains(r#"RUN ["/bin/sh", "-c", "cargo fetch && echo \"ready\""]"#));

    // Everything staged by the build is gone; the config dir itself pre-existed.
    let cfg_dir = &session.config_dir;
    assert!(cfg_dir.join("devcontainer.json").is_file());
    assert!(!cfg_dir.join(SUPERVISOR_FILE).exists());
    assert!(!cfg_dir.join(SUPERVISOR_STAMP).exists());
    assert!(!cfg_dir.join(DOCKERFILE).exists());
}

#[test]
fn test_no_username_arg_without_remote_user() {
    let ws = Workspace::new("demo", None);
    let session = ws.session();
    let rt = FakeRuntime::absent();
    let sink = MemorySink::new();

    BuildPipeline::new(&rt, &sink, Some(ws.supervisor.clone()))
        .build(&session, &[])
        .expect("build");

    let spec = &rt.builds()[0];
    assert_eq!(spec.build_args.len(), 1);
    assert_eq!(spec.build_args[0].0, "BASE_IMAGE");
    assert_eq!(spec.build_args[0].1, cdc::config::DEFAULT_FALLBACK_IMAGE);
    assert!(!rt.snapshots()[0].dockerfile.contains(POST_CREATE_MARKER));
}

#[test]
fn test_failed_build_still_cleans_up() {
    let ws = Workspace::new("demo", Some(CONFIG));
    let session = ws.session();
    let rt = FakeRuntime::absent();
    rt.set(|s| s.build_fails = true);
    let sink = MemorySink::new();

    let err = BuildPipeline::new(&rt, &sink, Some(ws.supervisor.clone()))
        .build(&session, &session.post_create_steps)
        .expect_err("build fails");
    assert!(err.engine_output().is_some());
    let cfg_dir = ws.project.join(".devcontainer");
    assert!(!cfg_dir.join(SUPERVISOR_FILE).exists());
    assert!(!cfg_dir.join(DOCKERFILE).exists());
}

#[test]
fn test_user_authored_files_are_used_and_kept() {
    let ws = Workspace::new("demo", Some(CONFIG));
    let session = ws.session();
    let cfg_dir = ws.project.join(".devcontainer");
    fs::write(cfg_dir.join(SUPERVISOR_FILE), b"custom supervisor").expect("write");
    fs::write(cfg_dir.join(DOCKERFILE), "FROM alpine\n").expect("write");
    let rt = FakeRuntime::absent();
    let sink = MemorySink::new();

    BuildPipeline::new(&rt, &sink, Some(ws.supervisor.clone()))
        .build(&session, &session.post_create_steps)
        .expect("build");

    assert_eq!(rt.snapshots()[0].dockerfile, "FROM alpine\n");
    assert_eq!(
        fs::read(cfg_dir.join(SUPERVISOR_FILE)).expect("read"),
        b"custom supervisor"
    );
    assert_eq!(
        fs::read_to_string(cfg_dir.join(DOCKERFILE)).expect("read"),
        "FROM alpine\n"
    );
    assert!(sink.contains("user-authored"));
}

#[test]
fn test_stale_generated_dockerfile_is_regenerated_without_duplicates() {
    let ws = Workspace::new("demo", Some(CONFIG));
    let session = ws.session();
    let cfg_dir = ws.project.join(".devcontainer");
    let leftover = cdc::pipeline::dockerfile::render(
        cdc::pipeline::dockerfile::TEMPLATE,
        &session.post_create_steps,
    );
    fs::write(cfg_dir.join(DOCKERFILE), &leftover).expect("write");
    let rt = FakeRuntime::absent();
    let sink = MemorySink::new();

    BuildPipeline::new(&rt, &sink, Some(ws.supervisor.clone()))
        .build(&session, &session.post_create_steps)
        .expect("build");

    let content = &rt.snapshots()[0].dockerfile;
    assert_eq!(content.matches("cargo fetch").count(), 1);
    assert!(!cfg_dir.join(DOCKERFILE).exists());
}

#[test]
fn test_missing_supervisor_binary_fails_before_build() {
    let ws = Workspace::new("demo", None);
    let session = ws.session();
    let rt = FakeRuntime::absent();
    let sink = MemorySink::new();

    let err = BuildPipeline::new(&rt, &sink, None)
        .build(&session, &[])
        .expect_err("no supervisor");
    assert!(err.to_string().contains("CODIUM_DEVCONTAINER_SUPERVISOR_BIN"));
    assert_eq!(rt.count("build"), 0);
    assert!(!ws.project.join(".devcontainer").exists());
}
