use std::path::Path;

use event_socket::{Encoding, SocketConfig};
use serde::{Deserialize, Serialize};

// =============================================================================
// evsock config (figment-deserialized from defaults / evsock.toml / env / flags)
// =============================================================================
//
//   evsock.toml:     topics = ["telemetry"]
//                    [socket]
//                    endpoint = "ws://10.0.0.5/ws/events"
//
//   env var:         EVSOCK_SOCKET__ENDPOINT=ws://10.0.0.5/ws/events
//                    (double underscore = nesting)

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1/ws/events";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_socket")]
    pub socket: SocketConfig,
    /// Topics to tail when none are given on the command line.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            topics: Vec::new(),
        }
    }
}

fn default_socket() -> SocketConfig {
    SocketConfig {
        endpoint: DEFAULT_ENDPOINT.to_string(),
        ..Default::default()
    }
}

/// Values given as command-line flags. Only the ones actually set are
/// serialized, so unset flags never shadow the file or the environment.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "SocketOverrides::is_empty")]
    pub socket: SocketOverrides,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SocketOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
}

impl SocketOverrides {
    fn is_empty(&self) -> bool {
        self.endpoint.is_none() && self.encoding.is_none()
    }
}

/// Build a figment that layers: defaults → config file → EVSOCK_* env vars →
/// command-line flags.
///
/// Env vars use double-underscore for nesting:
///   `EVSOCK_SOCKET__ENCODING=msgpack`  →  `socket.encoding = "msgpack"`
///   `EVSOCK_SOCKET__RECONNECT_DELAY_MS=500`  →  `socket.reconnect_delay_ms = 500`
pub fn load_config(config_file: Option<&Path>, overrides: &CliOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed("EVSOCK_").split("__"))
        .merge(Serialized::defaults(overrides))
}
