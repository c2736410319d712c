use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;

static INIT: OnceCell<()> = OnceCell::new();

/// Host-side tracing: only installed when `CODIUM_DEVCONTAINER_TRACING_FMT=1`, so the CLI's
/// stderr stays quiet by default. Filter comes from `RUST_LOG` (default `warn`).
pub fn telemetry_init() -> bool {
    if env::var("CODIUM_DEVCONTAINER_TRACING_FMT").ok().as_deref() != Some("1") {
        return false;
    }
    install(&env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
}

/// Supervisor tracing: always on, written to stderr where `docker logs` picks it up.
pub fn supervisor_init() -> bool {
    install(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
}

fn install(filter: &str) -> bool {
    if INIT.get().is_some() {
        return false;
    }
    let env_filter = tracing_subscriber::EnvFilter::new(filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("codium-devcontainer: tracing init skipped (global subscriber already set)");
        return false;
    }
    let _ = INIT.set(());
    true
}
