// ── Bridge configuration ──
//
// The fully-parsed configuration the bridge runs from. Produced by the
// config crate; the core never reads files itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rest2mqtt_api::{Api, TransportConfig};
use secrecy::SecretString;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Everything needed to run a bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt: MqttSettings,
    pub http: TransportConfig,
    /// APIs in registration order.
    pub apis: Vec<Arc<Api>>,
    /// Directory holding the `{api}.auth` token files.
    pub token_dir: PathBuf,
}

/// Broker connection parameters.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub client_id: String,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
    pub keep_alive: Duration,
}

impl MqttSettings {
    /// Settings for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_MQTT_PORT,
            username: None,
            password: None,
            client_id: default_client_id(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

/// `rest2mqtt-{hostname}-{user}`
pub fn default_client_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".into());
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());
    format!("rest2mqtt-{host}-{user}")
}
