//! Streaming client timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeouts and delays shared by every client of a fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Upper bound on one poll of the event socket.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// How long to wait for the replay acknowledgement.
    #[serde(default = "default_replay_timeout_ms")]
    pub replay_timeout_ms: u64,
    /// Fixed delay before every reconnect attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Upper bound on one connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_poll_timeout_ms() -> u64 { 100 }
fn default_replay_timeout_ms() -> u64 { 5_000 }
fn default_reconnect_delay_ms() -> u64 { 1_000 }
fn default_connect_timeout_ms() -> u64 { 5_000 }

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            replay_timeout_ms: default_replay_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClientSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn replay_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let s: ClientSettings = serde_json::from_str(r#"{"reconnect_delay_ms": 250}"#).unwrap();
        assert_eq!(s.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(s.poll_timeout_ms, 100);
        assert_eq!(s.replay_timeout_ms, 5_000);
        assert_eq!(s.connect_timeout_ms, 5_000);
    }
}
