//! Zombie reaping for when the supervisor runs as PID 1.

/// Reap every exited child except `keep`, without blocking. Returns how many were reaped.
///
/// Exited children are peeked with `WNOWAIT` first so `keep` (the daemon, still owned by
/// its `Child` handle) is never collected here; reaping stops at it for this round.
#[cfg(target_os = "linux")]
pub fn reap_orphans(keep: Option<u32>) -> usize {
    use nix::sys::wait::{waitid, waitpid, Id, WaitPidFlag};

    let mut reaped = 0;
    loop {
        let peek = waitid(
            Id::All,
            WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT,
        );
        let Some(pid) = peek.ok().and_then(|status| status.pid()) else {
            break;
        };
        if keep == Some(pid.as_raw() as u32) {
            break;
        }
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                tracing::debug!(pid = pid.as_raw(), ?status, "reaped orphan");
                reaped += 1;
            }
            Err(e) => {
                tracing::debug!(pid = pid.as_raw(), error = %e, "reap failed");
                break;
            }
        }
    }
    reaped
}

#[cfg(not(target_os = "linux"))]
pub fn reap_orphans(_keep: Option<u32>) -> usize {
    0
}
