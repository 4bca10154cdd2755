//! Timeout arithmetic for the cleanup sweep.
//!
//! All values are whole seconds. A host suspend shows up as a gap between
//! two watchdog ticks that is far longer than the tick interval; that gap is
//! added to every threshold so sessions are not reaped just because the
//! machine was asleep.

use crate::config::EffectiveConfig;

/// Time attributed to a host suspend since the previous cleanup.
///
/// Only detected when the watchdog is running and a previous cleanup exists:
/// if more than two intervals elapsed, everything beyond one interval is
/// treated as suspend time.
pub fn suspend_gap(now: u64, last_cleanup: u64, interval: u64, watchdog_running: bool) -> u64 {
    if last_cleanup == 0 || !watchdog_running {
        return 0;
    }
    let elapsed = now.saturating_sub(last_cleanup);
    if elapsed > interval.saturating_mul(2) {
        elapsed - interval
    } else {
        0
    }
}

/// Expiry thresholds for one cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Applies to sessions that never processed a command.
    pub create_session_timeout: u64,
    /// Applies to sessions that processed at least one command.
    pub last_command_timeout: u64,
}

impl ExpiryPolicy {
    pub fn new(config: &EffectiveConfig, suspend: u64) -> Self {
        Self {
            create_session_timeout: suspend.saturating_add(config.last_create_session_timeout),
            last_command_timeout: suspend.saturating_add(config.last_command_timeout),
        }
    }

    /// `last_command_at == 0` means the session was never used.
    pub fn is_expired(&self, now: u64, created_at: u64, last_command_at: u64) -> bool {
        if last_command_at == 0 {
            now.saturating_sub(created_at) >= self.create_session_timeout
        } else {
            now.saturating_sub(last_command_at) >= self.last_command_timeout
        }
    }
}

/// Whether a server that has been empty since `empty_since` should shut down.
pub fn idle_shutdown_due(now: u64, empty_since: u64, idle_timeout: u64, suspend: u64) -> bool {
    idle_timeout > 0
        && empty_since != 0
        && now.saturating_sub(empty_since) >= suspend.saturating_add(idle_timeout)
}
