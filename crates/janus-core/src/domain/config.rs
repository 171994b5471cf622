//! Session timing configuration.
//!
//! [`SessionConfig`] holds every deadline the client applies to the gateway.
//! It is a plain struct with no environment or file access; the client's
//! infrastructure layer fills it from the TOML config file or CLI flags.

use std::time::Duration;

use crate::protocol::messages::STREAMING_PLUGIN;

/// Deadlines and plugin selection for one client connection.
///
/// # Example
///
/// ```rust
/// use janus_core::domain::SessionConfig;
/// use std::time::Duration;
///
/// let cfg = SessionConfig::default();
/// assert_eq!(cfg.control_timeout, Duration::from_secs(10));
/// assert_eq!(cfg.capture_timeout, Duration::from_secs(15));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for control requests: create, attach, list, keepalive.
    pub control_timeout: Duration,

    /// Deadline for one capture request, measured from when it is sent.
    pub capture_timeout: Duration,

    /// Deadline for opening the WebSocket, per attempt.
    pub connect_timeout: Duration,

    /// How often to send a session keepalive while ready.
    ///
    /// `None` disables keepalives.  The gateway reclaims idle sessions after
    /// 60 seconds by default, so the interval should stay well below that.
    pub keepalive_interval: Option<Duration>,

    /// Plugin package providing stream listing and snapshots.
    pub listing_plugin: String,
}

impl Default for SessionConfig {
    /// | Field              | Default                  |
    /// |--------------------|--------------------------|
    /// | control_timeout    | 10 seconds               |
    /// | capture_timeout    | 15 seconds               |
    /// | connect_timeout    | 10 seconds               |
    /// | keepalive_interval | 25 seconds               |
    /// | listing_plugin     | `janus.plugin.streaming` |
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_secs(10),
            capture_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Some(Duration::from_secs(25)),
            listing_plugin: STREAMING_PLUGIN.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
