//! Disposable, SSH-reachable development containers.
//!
//! The host side converges one container per workspace (`reconcile`), builds its image
//! (`pipeline`), and prepares key-based SSH access (`ssh`). Inside the container the
//! `supervisor` owns the SSH daemon and stops the container once nobody is connected.

pub mod color;
pub mod config;
pub mod decision;
pub mod diagnostics;
pub mod docker;
pub mod errors;
pub mod lock;
pub mod pipeline;
pub mod port;
pub mod reconcile;
pub mod session;
pub mod ssh;
pub mod supervisor;
pub mod telemetry;
pub mod util;

pub use color::{
    color_enabled_stderr, log_error_stderr, log_info_stderr,
    log_warn_stderr, paint, set_color_mode, ColorMode,
};
pub use config::{DevcontainerConfig, Settings};
pub use decision::{Choice, DecisionPoint, DecisionProvider, FixedDecisions, TerminalDecisions};
pub use diagnostics::{DiagnosticSink, MemorySink, StderrSink};
pub use docker::{container_runtime_path, ContainerRuntime, DockerCli};
pub use errors::{
    exit_code_for_io_error, exit_code_for_reconcile_error, exit_code_for_runtime_error,
    ReconcileError, RuntimeError,
};
pub use lock::{acquire_lock_at, acquire_session_lock, SessionLock};
pub use port::allocate_port;
pub use reconcile::{resolve_effective_user, EffectiveUser, Ready, Reconciler};
pub use session::{workspace_slug, Session};
