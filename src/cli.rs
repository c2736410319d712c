use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// How decision points are answered.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, clap::ValueEnum)]
pub(crate) enum Policy {
    /// Ask on the terminal; non-interactive stdin cancels
    Prompt,
    /// Always rebuild
    Rebuild,
    /// Always reuse
    Reuse,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Ensure the workspace container is running and reachable, then print its SSH port
    Up {
        /// Rebuild the image and replace the container even if it is up to date
        #[arg(long)]
        rebuild: bool,
        /// Answer rebuild/reuse questions: prompt|rebuild|reuse
        #[arg(long, value_enum, default_value_t = Policy::Prompt)]
        policy: Policy,
    },
    /// Like `up`, then open an interactive SSH session
    Shell {
        /// Rebuild the image and replace the container even if it is up to date
        #[arg(long)]
        rebuild: bool,
        /// Answer rebuild/reuse questions: prompt|rebuild|reuse
        #[arg(long, value_enum, default_value_t = Policy::Prompt)]
        policy: Policy,
        /// Remove the container when the session ends
        #[arg(long = "remove-on-exit")]
        remove_on_exit: bool,
    },
    /// Ask the in-container supervisor to stop; falls back to stopping the container
    Stop,
    /// Remove the container and its SSH host entry
    Down,
    /// Show the container state and mapped port
    Status,
    /// Run diagnostics to check environment and configuration
    Doctor,
}

#[derive(Parser, Debug)]
#[command(
    name = "codium-devcontainer",
    version,
    about = "Build, run and reach a per-workspace development container over SSH.",
    after_long_help = "Examples:\n  codium-devcontainer up\n  codium-devcontainer up --rebuild --policy rebuild\n  codium-devcontainer shell --remove-on-exit\n  codium-devcontainer --project ~/src/api status\n\n",
    after_help = "\n"
)]
pub(crate) struct Cli {
    /// Project folder (default: current directory)
    #[arg(long, global = true)]
    pub(crate) project: Option<PathBuf>,

    /// Echo every engine and ssh command
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<codium_devcontainer::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}
