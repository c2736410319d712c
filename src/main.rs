use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;
mod commands;
mod doctor;

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        codium_devcontainer::set_color_mode(mode);
    }
    codium_devcontainer::telemetry::telemetry_init();

    match &cli.command {
        Command::Doctor => {
            let project = cli
                .project
                .clone()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));
            doctor::run_doctor(&project, cli.verbose);
            ExitCode::from(0)
        }
        Command::Up { rebuild, policy } => commands::run_up(&cli, *rebuild, *policy),
        Command::Shell {
            rebuild,
            policy,
            remove_on_exit,
        } => commands::run_shell(&cli, *rebuild, *policy, *remove_on_exit),
        Command::Stop => commands::run_stop(&cli),
        Command::Down => commands::run_down(&cli),
        Command::Status => commands::run_status(&cli),
    }
}
