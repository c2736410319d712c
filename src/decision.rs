//! Decision points surfaced to the operator (rebuild vs reuse, key selection).
//!
//! The reconciler and the SSH bootstrap only see the `DecisionProvider` trait; the CLI
//! injects a terminal prompt or a fixed headless policy.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::color::{color_enabled_stderr, paint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPoint {
    /// The devcontainer config changed after the container was created.
    StaleConfig,
    /// A rebuild is pending but the container is running; stopping it is destructive.
    RebuildRunning,
}

impl DecisionPoint {
    pub fn question(&self, container: &str) -> String {
        match self {
            DecisionPoint::StaleConfig => format!(
                "the devcontainer config changed since '{container}' was created. Rebuild it?"
            ),
            DecisionPoint::RebuildRunning => {
                format!("'{container}' is running. Kill it and rebuild, or reuse it as is?")
            }
        }
    }

    /// Labels for (rebuild, reuse).
    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            DecisionPoint::StaleConfig => ("Rebuild", "Reuse"),
            DecisionPoint::RebuildRunning => ("Kill & Rebuild", "Reuse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Rebuild,
    Reuse,
}

pub trait DecisionProvider {
    /// `None` means the prompt was dismissed; the caller aborts.
    fn decide(&self, point: DecisionPoint, container: &str) -> Option<Choice>;

    /// Ask for a public key file after the conventional ones were not found.
    fn pick_public_key(&self, searched: &[PathBuf]) -> Option<PathBuf>;
}

/// Headless policy: always answers the same way and never picks a key.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecisions(pub Choice);

impl DecisionProvider for FixedDecisions {
    fn decide(&self, point: DecisionPoint, container: &str) -> Option<Choice> {
        tracing::info!(?point, container, choice = ?self.0, "decision answered by policy");
        Some(self.0)
    }

    fn pick_public_key(&self, _searched: &[PathBuf]) -> Option<PathBuf> {
        None
    }
}

/// Interactive prompt on stderr/stdin. Non-interactive stdin dismisses every prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalDecisions;

impl TerminalDecisions {
    fn interactive() -> bool {
        atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stderr)
    }

    fn read_answer(prompt: &str) -> Option<String> {
        let use_err = color_enabled_stderr();
        eprint!("{}", paint(use_err, "\x1b[33m", prompt));
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl DecisionProvider for TerminalDecisions {
    fn decide(&self, point: DecisionPoint, container: &str) -> Option<Choice> {
        if !Self::interactive() {
            eprintln!("codium-devcontainer: cannot ask for confirmation on non-interactive stdin. Re-run with --policy rebuild or --policy reuse.");
            return None;
        }
        let (rebuild, reuse) = point.labels();
        let prompt = format!(
            "codium-devcontainer: {} [r]={} / [u]={} / anything else cancels: ",
            point.question(container),
            rebuild,
            reuse
        );
        parse_choice(&Self::read_answer(&prompt)?)
    }

    fn pick_public_key(&self, searched: &[PathBuf]) -> Option<PathBuf> {
        if !Self::interactive() {
            return None;
        }
        let tried = searched
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "codium-devcontainer: no public key found ({tried}). Path to a public key (empty to skip): "
        );
        let answer = Self::read_answer(&prompt)?;
        if answer.is_empty() {
            return None;
        }
        let p = expand_home(&answer);
        p.is_file().then_some(p)
    }
}

fn parse_choice(answer: &str) -> Option<Choice> {
    match answer.to_ascii_lowercase().as_str() {
        "r" | "rebuild" | "k" | "kill" => Some(Choice::Rebuild),
        "u" | "reuse" => Some(Choice::Reuse),
        _ => None,
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(h) = home::home_dir() {
            return h.join(rest);
        }
    }
    Path::new(raw).to_path_buf()
}
