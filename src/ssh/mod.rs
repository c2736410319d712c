#![allow(clippy::module_name_repetitions)]
//! SSH side of a session: key bootstrap, login verification, the `Host` alias in the
//! user's client config, and interactive sessions.

mod bootstrap;
mod client;
mod host_config;

pub use bootstrap::{
    classify_login_failure, install_key_script, read_public_key, AccessReport, Bootstrap,
    LoginFailure, KEY_CANDIDATES,
};
pub use client::{
    ephemeral_host_options, private_key_for, LoginAttempt, LoginProbe, OpenSsh, SessionHandle,
    LOOPBACK,
};
pub use host_config::{remove_host_block, remove_text, upsert_host_block, upsert_text, HostBlock};

/// Manual steps printed when automatic access setup did not verify.
pub fn manual_instructions(container: &str, user: &str, port: u16) -> String {
    format!(
        "Connect manually:\n  \
docker exec -i --user root {container} sh -c 'mkdir -p ~{user}/.ssh && cat >> ~{user}/.ssh/authorized_keys' < ~/.ssh/id_ed25519.pub\n  \
ssh -p {port} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {user}@{LOOPBACK}"
    )
}
