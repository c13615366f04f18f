//! Session driver settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for a [`DeviceSession`](crate::session::DeviceSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Buffered cycle reports per subscriber before the slowest one lags
    pub change_capacity: usize,
    /// Queued commands before `send_command` waits
    pub command_capacity: usize,
    /// Consecutive transport errors tolerated before the session stops
    pub max_transport_errors: u32,
    /// First backoff after a transport error; doubles per consecutive error
    pub backoff_base_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { change_capacity: 64, command_capacity: 16, max_transport_errors: 10, backoff_base_ms: 50 }
    }
}

impl SessionConfig {
    /// Backoff after the `error_count`-th consecutive transport error.
    pub fn backoff(&self, error_count: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1 << error_count.min(5)))
    }
}
