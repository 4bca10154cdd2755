//! Server configuration and the clamping rules applied to it.

use serde::{Deserialize, Serialize};

/// Default session table capacity.
pub const DEFAULT_MAX_SESSION_SIZE: i64 = 64;
/// Default watchdog interval (seconds).
pub const DEFAULT_WATCH_DOG_INTERVAL: i64 = 180;
/// Default idle timeout for sessions that have processed a command (seconds).
pub const DEFAULT_LAST_COMMAND_TIMEOUT: i64 = 3600;
/// Default timeout for sessions that never processed a command (seconds).
pub const DEFAULT_LAST_CREATE_SESSION_TIMEOUT: i64 = 300;

const SESSION_SIZE_RANGE: (i64, i64) = (2, 128);
const CREATE_SESSION_MIN_INTERVAL_RANGE: (i64, i64) = (0, 10);
pub(crate) const WATCH_DOG_INTERVAL_RANGE: (i64, i64) = (1, 3600);
const LAST_COMMAND_TIMEOUT_RANGE: (i64, i64) = (10, 7200);
const LAST_CREATE_SESSION_TIMEOUT_RANGE: (i64, i64) = (1, 600);

/// Values applied in restricted mode, for sandboxed or startup contexts
/// that only keep the server alive for about a minute.
const RESTRICTED_TIMEOUT: i64 = 60;
const RESTRICTED_MAX_SESSION_SIZE: i64 = 8;
const RESTRICTED_WATCH_DOG_INTERVAL: i64 = 15;
const RESTRICTED_LAST_CREATE_SESSION_TIMEOUT: i64 = 60;
const RESTRICTED_LAST_COMMAND_TIMEOUT: i64 = 60;

/// Raw configuration as supplied by flags or a config file.
///
/// Nothing here is validated; use [`ServerConfig::effective`] to get the
/// values the server actually runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shut the server down once it has had no sessions for this many
    /// seconds. `None` or a non-positive value disables it.
    pub timeout: Option<i64>,
    /// Session table capacity; the oldest session is evicted when full.
    pub max_session_size: i64,
    /// Minimum interval between CreateSession attempts (seconds).
    pub create_session_min_interval: i64,
    /// Watchdog tick interval (seconds).
    pub watch_dog_interval: i64,
    /// Remove a session not accessed for this many seconds.
    pub last_command_timeout: i64,
    /// Remove a session that never processed a command this many seconds
    /// after creation.
    pub last_create_session_timeout: i64,
    /// Launch with the restricted profile.
    pub restricted: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_session_size: DEFAULT_MAX_SESSION_SIZE,
            create_session_min_interval: 0,
            watch_dog_interval: DEFAULT_WATCH_DOG_INTERVAL,
            last_command_timeout: DEFAULT_LAST_COMMAND_TIMEOUT,
            last_create_session_timeout: DEFAULT_LAST_CREATE_SESSION_TIMEOUT,
            restricted: false,
        }
    }
}

/// Clamped configuration in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    /// 0 when idle shutdown is disabled.
    pub idle_shutdown_timeout: u64,
    pub max_session_size: usize,
    pub create_session_min_interval: u64,
    pub watchdog_interval: u64,
    pub last_command_timeout: u64,
    pub last_create_session_timeout: u64,
    pub restricted: bool,
}

impl ServerConfig {
    /// Apply the restricted profile (if requested) and clamp every value.
    pub fn effective(&self) -> EffectiveConfig {
        let mut raw = self.clone();
        if raw.restricted {
            raw.timeout = Some(RESTRICTED_TIMEOUT);
            raw.max_session_size = RESTRICTED_MAX_SESSION_SIZE;
            raw.watch_dog_interval = RESTRICTED_WATCH_DOG_INTERVAL;
            raw.last_create_session_timeout = RESTRICTED_LAST_CREATE_SESSION_TIMEOUT;
            raw.last_command_timeout = RESTRICTED_LAST_COMMAND_TIMEOUT;
        }

        EffectiveConfig {
            idle_shutdown_timeout: raw.timeout.filter(|t| *t > 0).unwrap_or(0) as u64,
            max_session_size: clamp(raw.max_session_size, SESSION_SIZE_RANGE) as usize,
            create_session_min_interval: clamp(
                raw.create_session_min_interval,
                CREATE_SESSION_MIN_INTERVAL_RANGE,
            ) as u64,
            watchdog_interval: clamp(raw.watch_dog_interval, WATCH_DOG_INTERVAL_RANGE) as u64,
            last_command_timeout: clamp(raw.last_command_timeout, LAST_COMMAND_TIMEOUT_RANGE)
                as u64,
            last_create_session_timeout: clamp(
                raw.last_create_session_timeout,
                LAST_CREATE_SESSION_TIMEOUT_RANGE,
            ) as u64,
            restricted: raw.restricted,
        }
    }
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        ServerConfig::default().effective()
    }
}

fn clamp(value: i64, (min, max): (i64, i64)) -> i64 {
    value.clamp(min, max)
}
