//! Configuration for the rest2mqtt bridge.
//!
//! A YAML file layered with `REST2MQTT_*` environment overrides, validated
//! up front and translated into `rest2mqtt_core::BridgeConfig`. The bridge
//! core never touches files itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use rest2mqtt_api::{Api, TlsMode, TransportConfig};
use rest2mqtt_core::{BridgeConfig, MqttSettings, TopicPattern};

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Prefix of environment overrides; `__` separates nesting levels.
pub const ENV_PREFIX: &str = "REST2MQTT_";

/// Shortest keep-alive the MQTT client accepts.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── File config structs ─────────────────────────────────────────────

/// Top-level YAML configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttSection,

    #[serde(default)]
    pub http: HttpSection,

    /// APIs in registration order.
    #[serde(default)]
    pub apis: Vec<Api>,

    /// Directory holding persisted tokens.
    #[serde(default = "default_token_dir")]
    pub token_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MqttSection {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, deserialize_with = "scalar::optional")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "scalar::secret")]
    pub password: Option<SecretString>,

    /// Empty means `rest2mqtt-{hostname}-{user}`.
    #[serde(default, deserialize_with = "scalar::string")]
    pub client_id: String,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            client_id: String::new(),
            reconnect_delay_secs: default_reconnect_delay(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpSection {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,

    /// PEM file with an extra trusted CA.
    pub ca_cert: Option<PathBuf>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

fn default_token_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_port() -> u16 {
    rest2mqtt_core::config::DEFAULT_MQTT_PORT
}
fn default_reconnect_delay() -> u64 {
    rest2mqtt_core::config::DEFAULT_RECONNECT_DELAY.as_secs()
}
fn default_keep_alive() -> u64 {
    rest2mqtt_core::config::DEFAULT_KEEP_ALIVE.as_secs()
}
fn default_timeout() -> u64 {
    30
}

// ── Scalar coercion ─────────────────────────────────────────────────

/// Text fields that YAML or the environment may hand over as numbers or
/// booleans, such as an all-digit password or client id.
mod scalar {
    use std::fmt;

    use secrecy::SecretString;
    use serde::Deserializer;
    use serde::de::{self, Visitor};

    struct Text;

    impl Visitor<'_> for Text {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string, number or boolean")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_i128<E: de::Error>(self, v: i128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    struct OptionalText;

    impl<'de> Visitor<'de> for OptionalText {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an optional string, number or boolean")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            string(d).map(Some)
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        d.deserialize_any(Text)
    }

    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        d.deserialize_option(OptionalText)
    }

    pub fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
        optional(d).map(|text| text.map(SecretString::from))
    }
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack: `path`, then `REST2MQTT_*` variables.
///
/// `REST2MQTT_MQTT__KEEP_ALIVE_SECS` addresses `mqtt.keep-alive-secs`: `__`
/// separates levels and `_` stands for `-` within a key.
pub fn figment(path: &Path) -> Figment {
    Figment::new().merge(Yaml::file(path)).merge(
        Env::prefixed(ENV_PREFIX)
            .split("__")
            .map(|key| key.as_str().replace('_', "-").into()),
    )
}

/// Load and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Load `path` straight into the form the bridge runs from.
pub fn load_bridge_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    load_config(path).map(Config::into_bridge_config)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Reject configurations the bridge cannot start from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(invalid("mqtt.host", "a broker host is required"));
        }
        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(invalid(
                "mqtt.keep-alive-secs",
                format!("must be at least {MIN_KEEP_ALIVE_SECS}"),
            ));
        }
        if self.apis.is_empty() {
            return Err(invalid("apis", "at least one API must be configured"));
        }

        let mut names = HashSet::new();
        for api in &self.apis {
            if !names.insert(api.name.as_str()) {
                return Err(invalid(
                    "apis",
                    format!("API name '{}' is used more than once", api.name),
                ));
            }
            validate_api(api)?;
        }
        Ok(())
    }

    pub fn into_bridge_config(self) -> BridgeConfig {
        let Self {
            mqtt,
            http,
            apis,
            token_dir,
        } = self;

        let tls = if http.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(path) = http.ca_cert {
            TlsMode::CustomCa(path)
        } else {
            TlsMode::System
        };

        BridgeConfig {
            mqtt: MqttSettings {
                host: mqtt.host,
                port: mqtt.port,
                username: mqtt.username,
                password: mqtt.password,
                client_id: mqtt.client_id,
                reconnect_delay: Duration::from_secs(mqtt.reconnect_delay_secs),
                keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
            },
            http: TransportConfig {
                tls,
                timeout: Duration::from_secs(http.timeout_secs),
            },
            apis: apis.into_iter().map(Arc::new).collect(),
            token_dir,
        }
    }
}

fn validate_api(api: &Api) -> Result<(), ConfigError> {
    if api.name.trim().is_empty() {
        return Err(invalid("apis.name", "must not be empty"));
    }
    let field = |key: &str| format!("apis.{}.{key}", api.name);

    if api.base_url.trim().is_empty() {
        return Err(invalid(field("base-url"), "must not be empty"));
    }
    if api.base_topic.trim().is_empty() {
        return Err(invalid(field("base-topic"), "must not be empty"));
    }

    // Keys naming a non-publish endpoint are accepted and skipped at start.
    if let Some(key) = api.on_start.iter().find(|key| api.endpoint(key).is_none()) {
        return Err(invalid(
            field("on-start"),
            format!("no endpoint named '{key}'"),
        ));
    }

    for (key, endpoint) in api.subscribe_endpoints() {
        TopicPattern::compile(&endpoint.mqtt.topic)
            .map_err(|e| invalid(field(&format!("endpoints.{key}.mqtt.topic")), e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const MINIMAL: &str = r"
mqtt:
  host: broker.local
apis:
  - name: weather
    base-url: https://api.example.com/v1
    base-topic: home/weather
    on-start: [forecast]
    endpoints:
      current:
        path: weather/%city%
        mqtt: { topic: 'get/%city%', action: subscribe }
      forecast:
        path: forecast
        mqtt: { topic: forecast, action: publish }
        selector: '$.days[*]'
";

    fn load(jail: &Jail) -> Result<Config, ConfigError> {
        load_config(&jail.directory().join(DEFAULT_CONFIG_FILE))
    }

    fn validation_field(err: &ConfigError) -> &str {
        match err {
            ConfigError::Validation { field, .. } => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_missing_sections() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, MINIMAL)?;
            let config = load(jail).unwrap();

            assert_eq!(config.mqtt.host, "broker.local");
            assert_eq!(config.mqtt.port, 1883);
            assert_eq!(config.mqtt.reconnect_delay_secs, 5);
            assert_eq!(config.mqtt.keep_alive_secs, 30);
            assert_eq!(config.http.timeout_secs, 30);
            assert!(!config.http.insecure);
            assert_eq!(config.token_dir, PathBuf::from("."));
            assert_eq!(config.apis.len(), 1);
            assert_eq!(config.apis[0].endpoints.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, MINIMAL)?;
            jail.set_env("REST2MQTT_MQTT__HOST", "override.local");
            jail.set_env("REST2MQTT_MQTT__PORT", "8883");
            jail.set_env("REST2MQTT_MQTT__PASSWORD", "s3cret");
            jail.set_env("REST2MQTT_HTTP__TIMEOUT_SECS", "5");

            let config = load(jail).unwrap();
            assert_eq!(config.mqtt.host, "override.local");
            assert_eq!(config.mqtt.port, 8883);
            assert_eq!(
                config.mqtt.password.as_ref().unwrap().expose_secret(),
                "s3cret"
            );
            assert_eq!(config.http.timeout_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_multi_word_keys_set_in_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &MINIMAL.replace(
                    "  host: broker.local\n",
                    "  host: broker.local\n  keep-alive-secs: 30\n  client-id: from-file\n",
                ),
            )?;
            jail.set_env("REST2MQTT_MQTT__KEEP_ALIVE_SECS", "60");
            jail.set_env("REST2MQTT_MQTT__CLIENT_ID", "from-env");
            jail.set_env("REST2MQTT_TOKEN_DIR", "/var/lib/rest2mqtt");

            let config = load(jail).unwrap();
            assert_eq!(config.mqtt.keep_alive_secs, 60);
            assert_eq!(config.mqtt.client_id, "from-env");
            assert_eq!(config.token_dir, PathBuf::from("/var/lib/rest2mqtt"));
            Ok(())
        });
    }

    #[test]
    fn numeric_credentials_are_read_as_text() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &MINIMAL.replace(
                    "  host: broker.local\n",
                    "  host: broker.local\n  username: 1001\n  password: 4242\n",
                ),
            )?;
            let config = load(jail).unwrap();
            assert_eq!(config.mqtt.username.as_deref(), Some("1001"));
            assert_eq!(
                config.mqtt.password.as_ref().unwrap().expose_secret(),
                "4242"
            );

            jail.set_env("REST2MQTT_MQTT__PASSWORD", "12345");
            jail.set_env("REST2MQTT_MQTT__CLIENT_ID", "98765");
            let config = load(jail).unwrap();
            assert_eq!(
                config.mqtt.password.as_ref().unwrap().expose_secret(),
                "12345"
            );
            assert_eq!(config.mqtt.client_id, "98765");
            Ok(())
        });
    }

    #[test]
    fn absent_credentials_stay_unset() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, MINIMAL)?;
            let config = load(jail).unwrap();
            assert!(config.mqtt.username.is_none());
            assert!(config.mqtt.password.is_none());
            assert_eq!(config.mqtt.client_id, "");
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_reported() {
        Jail::expect_with(|jail| {
            let err = load(jail).unwrap_err();
            assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err:?}");
            Ok(())
        });
    }

    #[test]
    fn malformed_yaml_is_a_figment_error() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "mqtt: [unclosed")?;
            let err = load(jail).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)), "got: {err:?}");
            Ok(())
        });
    }

    #[test]
    fn broker_host_is_required() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, &MINIMAL.replace("broker.local", "''"))?;
            let err = load(jail).unwrap_err();
            assert_eq!(validation_field(&err), "mqtt.host");
            Ok(())
        });
    }

    #[test]
    fn at_least_one_api_is_required() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, "mqtt:\n  host: broker.local\n")?;
            let err = load(jail).unwrap_err();
            assert_eq!(validation_field(&err), "apis");
            Ok(())
        });
    }

    #[test]
    fn duplicate_api_names_are_rejected() {
        Jail::expect_with(|jail| {
            let api = "  - name: twin\n    base-url: http://a\n    base-topic: t\n";
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &format!("mqtt:\n  host: b\napis:\n{api}{api}"),
            )?;
            let err = load(jail).unwrap_err();
            assert!(err.to_string().contains("'twin'"), "got: {err}");
            Ok(())
        });
    }

    #[test]
    fn unknown_on_start_endpoint_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &MINIMAL.replace("on-start: [forecast]", "on-start: [nowcast]"),
            )?;
            let err = load(jail).unwrap_err();
            assert_eq!(validation_field(&err), "apis.weather.on-start");
            Ok(())
        });
    }

    #[test]
    fn on_start_may_name_a_subscribe_endpoint() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &MINIMAL.replace("on-start: [forecast]", "on-start: [current]"),
            )?;
            let config = load(jail).unwrap();
            assert_eq!(config.apis[0].on_start_endpoints().count(), 0);
            Ok(())
        });
    }

    #[test]
    fn broken_subscribe_topic_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &MINIMAL.replace("'get/%city%'", "'get/%city'"),
            )?;
            let err = load(jail).unwrap_err();
            assert_eq!(
                validation_field(&err),
                "apis.weather.endpoints.current.mqtt.topic"
            );
            Ok(())
        });
    }

    #[test]
    fn short_keep_alive_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, MINIMAL)?;
            jail.set_env("REST2MQTT_MQTT__KEEP_ALIVE_SECS", "1");
            let err = load(jail).unwrap_err();
            assert_eq!(validation_field(&err), "mqtt.keep-alive-secs");
            Ok(())
        });
    }

    #[test]
    fn translates_into_bridge_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                &format!(
                    "{MINIMAL}token-dir: tokens\nhttp:\n  insecure: true\n  timeout-secs: 10\n"
                ),
            )?;
            let bridge = load_bridge_config(&jail.directory().join(DEFAULT_CONFIG_FILE)).unwrap();

            assert_eq!(bridge.mqtt.host, "broker.local");
            assert_eq!(bridge.mqtt.reconnect_delay, Duration::from_secs(5));
            assert!(matches!(bridge.http.tls, TlsMode::DangerAcceptInvalid));
            assert_eq!(bridge.http.timeout, Duration::from_secs(10));
            assert_eq!(bridge.token_dir, PathBuf::from("tokens"));
            assert_eq!(bridge.apis[0].name, "weather");
            Ok(())
        });
    }

    #[test]
    fn ca_cert_selects_custom_trust() {
        let config = Config {
            mqtt: MqttSection::default(),
            http: HttpSection {
                ca_cert: Some(PathBuf::from("ca.pem")),
                ..HttpSection::default()
            },
            apis: Vec::new(),
            token_dir: default_token_dir(),
        };
        let bridge = config.into_bridge_config();
        assert!(matches!(bridge.http.tls, TlsMode::CustomCa(ref p) if p == Path::new("ca.pem")));
    }
}
