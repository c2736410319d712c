//! Point-in-time snapshot of established TCP connections on the SSH port.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub trait ConnectionProbe {
    /// True when at least one established connection uses the local SSH port.
    fn has_established(&mut self) -> bool;
}

const TCP_ESTABLISHED: &str = "01";

/// Established connections in a `/proc/net/tcp{,6}` table whose local port is `port`.
pub fn count_established(table: &str, port: u16) -> usize {
    table
        .lines()
        .skip(1)
        .filter(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 || fields[3] != TCP_ESTABLISHED {
                return false;
            }
            fields[1]
                .rsplit_once(':')
                .and_then(|(_, p)| u16::from_str_radix(p, 16).ok())
                == Some(port)
        })
        .count()
}

/// Established connections in `ss -Htn state established` output whose local address
/// ends in `:port`.
pub fn count_established_ss(output: &str, port: u16) -> usize {
    let suffix = format!(":{port}");
    output
        .lines()
        .filter(|line| {
            // Recv-Q Send-Q Local:Port Peer:Port
            let fields: Vec<&str> = line.split_whitespace().collect();
            fields.len() >= 4 && fields[2].ends_with(&suffix)
        })
        .count()
}

/// Reads the kernel's connection tables, falling back to `ss` when `/proc/net` is not
/// readable.
pub struct ProcNetProbe {
    port: u16,
    tables: Vec<PathBuf>,
}

impl ProcNetProbe {
    pub fn new(port: u16) -> Self {
        ProcNetProbe {
            port,
            tables: vec![
                PathBuf::from("/proc/net/tcp"),
                PathBuf::from("/proc/net/tcp6"),
            ],
        }
    }

    pub fn with_tables(port: u16, tables: Vec<PathBuf>) -> Self {
        ProcNetProbe { port, tables }
    }

    fn via_ss(&self) -> Option<usize> {
        let out = Command::new("ss")
            .args(["-Htn", "state", "established"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        out.status.success().then(|| {
            count_established_ss(&String::from_utf8_lossy(&out.stdout), self.port)
        })
    }
}

impl ConnectionProbe for ProcNetProbe {
    fn has_established(&mut self) -> bool {
        let mut readable = false;
        let mut total = 0;
        for path in &self.tables {
            if let Ok(table) = fs::read_to_string(path) {
                readable = true;
                total += count_established(&table, self.port);
            }
        }
        if !readable {
            match self.via_ss() {
                Some(n) => total = n,
                None => tracing::debug!("no connection table readable; counting poll as idle"),
            }
        }
        total > 0
    }
}
