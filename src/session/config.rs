#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use serde_json::json;

use crate::transport::traits::Payload;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Configuration for session behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat scheduling and payload
    pub heartbeat: HeartbeatConfig,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for the periodic heartbeat.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Tick interval. [`Duration::ZERO`] disables the scheduler entirely.
    pub interval: Duration,
    /// Payload sent on each tick
    pub payload: Payload,
    /// Skip ticks while the connection is not open. Off by default: a tick
    /// while disconnected is a cheap local send failure.
    pub require_open: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            payload: default_heartbeat_payload(),
            require_open: false,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of automatic reconnect attempts per failure streak
    pub max_attempts: u32,
    /// Permit one additional attempt after the ceiling is hit before the
    /// streak is treated as terminal. Off by default; kept for callers that
    /// depend on the historical `max_attempts + 1` behavior.
    pub extra_attempt: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            extra_attempt: false,
        }
    }
}

/// The stock keepalive marker: `{"msgType":1}` as a binary JSON frame.
#[must_use]
pub fn default_heartbeat_payload() -> Payload {
    Payload::Binary(json!({"msgType": 1}).to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_heartbeat_is_sixty_seconds() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat.interval, Duration::from_secs(60));
        assert!(!config.heartbeat.require_open);
    }

    #[test]
    fn default_reconnect_ceiling_is_five() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert!(!config.extra_attempt);
    }

    #[test]
    fn default_payload_is_keepalive_marker() {
        match default_heartbeat_payload() {
            Payload::Binary(bytes) => {
                let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(value, json!({"msgType": 1}));
            }
            Payload::Text(_) => panic!("expected binary payload"),
        }
    }
}
