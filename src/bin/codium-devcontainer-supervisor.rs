use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use codium_devcontainer::supervisor::{
    ProcNetProbe, SshDaemon, Supervisor, SupervisorConfig,
};

static GOT_TERM: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_term(_sig: i32) {
    GOT_TERM.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let act = SigAction::new(
        SigHandler::Handler(handle_term),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        let _ = signal::sigaction(Signal::SIGTERM, &act);
        let _ = signal::sigaction(Signal::SIGINT, &act);
        let _ = signal::sigaction(Signal::SIGHUP, &act);
    }
}

fn main() -> ExitCode {
    codium_devcontainer::telemetry::supervisor_init();
    if std::env::args().nth(1).as_deref() == Some("--version") {
        println!(
            "codium-devcontainer-supervisor {} (target={} profile={})",
            env!("CARGO_PKG_VERSION"),
            env!("CODIUM_DEVCONTAINER_BUILD_TARGET"),
            env!("CODIUM_DEVCONTAINER_BUILD_PROFILE"),
        );
        return ExitCode::SUCCESS;
    }

    let config = SupervisorConfig::from_env();
    install_signal_handlers();

    let daemon = match SshDaemon::spawn(&config.sshd_path, config.ssh_port) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "cannot start sshd");
            return ExitCode::from(1);
        }
    };
    let probe = ProcNetProbe::new(config.ssh_port);
    let mut supervisor = Supervisor::new(config, probe, daemon, &GOT_TERM);
    let exit = supervisor.run();
    tracing::info!(?exit, polls = supervisor.polls(), "supervisor exiting");
    ExitCode::from(exit.exit_code())
}
