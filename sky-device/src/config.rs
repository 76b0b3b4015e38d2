//! Session tunables.

use std::time::Duration;

/// Configuration for a [`DeviceSession`](crate::DeviceSession)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait between failed connection attempts
    /// Default: 30 seconds
    pub retry_interval: Duration,

    /// Pause after the guide-close sequence before retrying a channel change
    /// Default: 1 second
    pub recovery_pause: Duration,

    /// Number of `Back` presses sent to back out of menus before that retry
    /// Default: 4
    pub recovery_back_presses: usize,

    /// Capacity of the session event channel
    /// Default: 64
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(30),
            recovery_pause: Duration::from_secs(1),
            recovery_back_presses: 4,
            event_buffer_size: 64,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
