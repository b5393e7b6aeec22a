use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;

/// Connection settings for one [`EventSocket`](crate::EventSocket).
///
/// Deserializable so hosts can embed it in their own config files:
///
/// ```toml
/// endpoint = "ws://device.local/ws/events"
/// encoding = "msgpack"
/// reconnect_delay_ms = 1000
/// unresponsive_timeout_ms = 2000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub encoding: Encoding,
    /// Fixed delay between a disconnect and the next attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Silence allowed before a connected peer is declared unresponsive.
    #[serde(default = "default_unresponsive_timeout_ms")]
    pub unresponsive_timeout_ms: u64,
    /// Start the liveness deadline as soon as the connection opens instead of
    /// waiting for the first frame.
    #[serde(default)]
    pub arm_on_open: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            encoding: Encoding::default(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            unresponsive_timeout_ms: default_unresponsive_timeout_ms(),
            arm_on_open: false,
        }
    }
}

impl SocketConfig {
    pub fn new(endpoint: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            endpoint: endpoint.into(),
            encoding,
            ..Default::default()
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn unresponsive_timeout(&self) -> Duration {
        Duration::from_millis(self.unresponsive_timeout_ms)
    }
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_unresponsive_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SocketConfig::default();
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.unresponsive_timeout(), Duration::from_secs(2));
        assert_eq!(config.encoding, Encoding::Json);
        assert!(!config.arm_on_open);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SocketConfig =
            serde_json::from_str(r#"{"endpoint":"ws://10.0.0.5/ws","encoding":"msgpack"}"#)
                .unwrap();
        assert_eq!(config.endpoint, "ws://10.0.0.5/ws");
        assert_eq!(config.encoding, Encoding::MsgPack);
        assert_eq!(config.reconnect_delay_ms, 1000);
        assert_eq!(config.unresponsive_timeout_ms, 2000);
    }
}
