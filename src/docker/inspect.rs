//! Parsing of engine output.

use std::time::SystemTime;

/// True when engine output says the object is missing (as opposed to a real failure).
pub fn looks_not_found(output: &str) -> bool {
    let s = output.to_ascii_lowercase();
    s.contains("no such container") || s.contains("no such object")
}

/// True when `docker port` says the container has no binding for the requested port.
pub fn looks_unpublished(output: &str) -> bool {
    let s = output.to_ascii_lowercase();
    s.contains("no public port")
}

/// Parse `{{.Created}}` (RFC 3339, UTC, up to nanosecond precision).
pub fn parse_created(raw: &str) -> Option<SystemTime> {
    let s = raw.trim().trim_matches('\'').trim_matches('"');
    if s.is_empty() || s.starts_with("0001-01-01") {
        return None;
    }
    humantime::parse_rfc3339(s)
        .or_else(|_| humantime::parse_rfc3339_weak(s))
        .ok()
}

/// Parse `docker port <name> 22/tcp` output (`127.0.0.1:49153`, `[::]:49153`, ...),
/// preferring an IPv4 loopback binding.
pub fn parse_port_output(raw: &str) -> Option<u16> {
    let mut first: Option<u16> = None;
    for line in raw.lines() {
        let line = line.trim();
        let Some((host, port)) = line.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.trim().parse::<u16>() else {
            continue;
        };
        if port == 0 {
            continue;
        }
        if host == "127.0.0.1" {
            return Some(port);
        }
        first.get_or_insert(port);
    }
    first
}
