//! Registry timing configuration.

use std::time::Duration;

/// Timers driving the connection registry.
///
/// Build one with `RegistryConfig::default()` and override just the
/// fields you care about.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a disconnected player keeps their seat before being
    /// removed from the room.
    ///
    /// Default: 10 seconds.
    pub reconnect_grace: Duration,

    /// How often connections are pinged. A connection that hasn't
    /// answered the previous ping by the next sweep is terminated.
    ///
    /// Default: 30 seconds.
    pub ping_interval: Duration,

    /// Rooms without activity for this long are closed by the sweep.
    ///
    /// Default: 30 minutes.
    pub room_idle_timeout: Duration,

    /// How often every active room is re-persisted.
    ///
    /// Default: 2 minutes.
    pub snapshot_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            room_idle_timeout: Duration::from_secs(30 * 60),
            snapshot_interval: Duration::from_secs(2 * 60),
        }
    }
}
