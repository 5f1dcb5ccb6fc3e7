use tracing::{info, warn};

/// File descriptors held back for the runtime, logging, and output files.
pub const RESERVED_FDS: u64 = 150;
/// Some progress is always allowed, however small the FD budget.
pub const SESSION_FLOOR: usize = 100;
/// Ceiling applied when no `max_work_count` was configured.
pub const UNCONFIGURED_CEILING: usize = 50_000;

const FD_TARGET: u64 = 65_535;
const HIGH_FD_THRESHOLD: u64 = 10_000;

/// Raise `RLIMIT_NOFILE` best-effort and return the final soft limit:
/// first soft -> hard, then 65535 if the limit is still below that.
#[cfg(unix)]
fn negotiated_fd_limit() -> u64 {
    use rlimit::Resource;

    let (soft, hard) = match Resource::NOFILE.get() {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "could not query RLIMIT_NOFILE, assuming 1024");
            return 1024;
        }
    };

    let mut soft = soft;
    if soft < hard {
        if Resource::NOFILE.set(hard, hard).is_ok() {
            info!(from = soft, to = hard, "raised fd soft limit to hard limit");
            soft = hard;
        } else {
            warn!(soft, hard, "failed to raise fd soft limit");
        }
    }

    if soft < FD_TARGET {
        let new_hard = hard.max(FD_TARGET);
        if Resource::NOFILE.set(FD_TARGET, new_hard).is_ok() {
            info!("raised fd limit to {FD_TARGET}");
            soft = FD_TARGET;
        }
    }

    if soft < 1024 {
        warn!(
            soft,
            "file descriptor limit is very low; run `ulimit -n 65535` for full throughput"
        );
    }
    soft
}

#[cfg(not(unix))]
fn negotiated_fd_limit() -> u64 {
    8000
}

/// Cap derivation from a known FD limit, kept pure for tests.
pub(crate) fn cap_from_limits(fd_limit: u64, configured: usize) -> usize {
    let usable = fd_limit.saturating_sub(RESERVED_FDS) as usize;

    let cap = if configured == 0 {
        if fd_limit >= HIGH_FD_THRESHOLD {
            usable.min(UNCONFIGURED_CEILING)
        } else {
            usable.max(SESSION_FLOOR)
        }
    } else if configured as u64 > usable as u64 {
        warn!(
            configured,
            fd_limit, "configured max_work_count exceeds usable file descriptors, clamping"
        );
        usable.max(SESSION_FLOOR)
    } else {
        configured
    };

    cap.max(SESSION_FLOOR)
}

/// The effective concurrent-session cap for this process.
pub fn effective_session_cap(configured: usize) -> usize {
    let fd_limit = negotiated_fd_limit();
    let cap = cap_from_limits(fd_limit, configured);
    info!(fd_limit, cap, "admission cap computed");
    cap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_large_limit_hits_ceiling() {
        assert_eq!(cap_from_limits(65_535, 0), UNCONFIGURED_CEILING);
        assert_eq!(cap_from_limits(20_000, 0), 19_850);
    }

    #[test]
    fn unconfigured_small_limit_keeps_floor() {
        assert_eq!(cap_from_limits(5_000, 0), 4_850);
        assert_eq!(cap_from_limits(200, 0), SESSION_FLOOR);
        assert_eq!(cap_from_limits(0, 0), SESSION_FLOOR);
    }

    #[test]
    fn configured_value_clamps_to_usable() {
        assert_eq!(cap_from_limits(65_535, 100_000), 65_385);
        assert_eq!(cap_from_limits(1_000, 5_000), 850);
    }

    #[test]
    fn reasonable_configured_value_passes_through() {
        assert_eq!(cap_from_limits(65_535, 500), 500);
        assert_eq!(cap_from_limits(65_535, 30_000), 30_000);
    }

    #[test]
    fn floor_applies_even_when_configured_tiny() {
        // A configured value below the floor is still raised to it.
        assert_eq!(cap_from_limits(65_535, 10), SESSION_FLOOR);
    }
}
