//! Ephemeral loopback port allocation for the container's SSH mapping.

use std::net::{Ipv4Addr, TcpListener};

/// Returned when the kernel refuses to hand out an ephemeral port.
/// Callers must tolerate that this port may already be busy.
pub const FALLBACK_PORT: u16 = 2222;

/// Bind 127.0.0.1:0, read back the assigned port and release the socket.
///
/// The port is free at request time only; the container's port mapping should be
/// created right after to keep the window short.
pub fn allocate_port() -> u16 {
    match TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).and_then(|l| l.local_addr()) {
        Ok(addr) => addr.port(),
        Err(e) => {
            tracing::warn!(error = %e, fallback = FALLBACK_PORT, "ephemeral port allocation failed");
            FALLBACK_PORT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_port_is_bindable() {
        let port = allocate_port();
        assert_ne!(port, 0);
        // Released immediately, so binding it again should normally work.
        if port != FALLBACK_PORT {
            let l = TcpListener::bind((Ipv4Addr::LOCALHOST, port));
            assert!(l.is_ok(), "port {port} not released");
        }
    }
}
