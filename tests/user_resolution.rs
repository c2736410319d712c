mod common;

use std::time::SystemTime;

use codium_devcontainer::resolve_effective_user;
use common::{ok_output, FakeRuntime};

const NAME: &str = "codium-devcontainer-demo";

#[test]
fn test_configured_user_wins_without_exec() {
    let rt = FakeRuntime::running(40022, SystemTime::now());
    let u = resolve_effective_user(&rt, NAME, Some("node")).expect("user");
    assert_eq!(u.name, "node");
    assert_eq!(u.notice, None);
    assert!(rt.execs().is_empty());
}

#[test]
fn test_default_non_root_identity_is_used() {
    let rt = FakeRuntime::running(40022, SystemTime::now());
    rt.reply("id -un", ok_output("vscode\n"));
    let u = resolve_effective_user(&rt, NAME, None).expect("user");
    assert_eq!(u.name, "vscode");
    assert_eq!(rt.execs().len(), 1);
}

#[test]
fn test_root_identity_prefers_regular_passwd_account() {
    let rt = FakeRuntime::running(40022, SystemTime::now());
    rt.reply("id -un", ok_output("root\n"));
    rt.reply("login.defs", ok_output("UID_MIN 500\n"));
    rt.reply(
        "passwd",
        ok_output(
            "root:x:0:0:root:/root:/bin/bash\n\
             daemon:x:1:1::/usr/sbin:/usr/sbin/nologin\n\
             nobody:x:65534:65534::/nonexistent:/usr/sbin/nologin\n\
             svc:x:600:600::/srv:/bin/false\n\
             dev:x:501:501::/home/dev:/bin/bash\n",
        ),
    );
    let u = resolve_effective_user(&rt, NAME, None).expect("user");
    assert_eq!(u.name, "dev");
    assert_eq!(u.notice, None);
}

#[test]
fn test_falls_back_to_home_directory_listing() {
    let rt = FakeRuntime::running(40022, SystemTime::now());
    rt.reply("id -un", ok_output("root\n"));
    rt.reply("passwd", ok_output("root:x:0:0:root:/root:/bin/sh\n"));
    rt.reply("ls -1 /home", ok_output("lost+found\nalice\n"));
    let u = resolve_effective_user(&rt, NAME, None).expect("user");
    assert_eq!(u.name, "alice");
}

#[test]
fn test_root_only_image_yields_root_with_notice() {
    let rt = FakeRuntime::running(40022, SystemTime::now());
    rt.reply("id -un", ok_output("root\n"));
    rt.reply("passwd", ok_output("root:x:0:0:root:/root:/bin/sh\n"));
    let u = resolve_effective_user(&rt, NAME, None).expect("user");
    assert_eq!(u.name, "root");
    assert!(u.notice.is_some_and(|n| n.contains("remoteUser")));
}
