//! Configuration model: APIs, their endpoints, authentication and MQTT bindings.
//!
//! Every type here is immutable once loaded. Runtime authentication state
//! (the token) is deliberately *not* part of the model; it lives in the
//! [`TokenStore`](crate::TokenStore) side table, keyed by API name.
//!
//! Keys are kebab-case to match the YAML configuration file:
//!
//! ```yaml
//! name: weather
//! base-url: https://api.example.com/v1
//! base-topic: home/weather
//! endpoints:
//!   current:
//!     path: weather/%city%
//!     mqtt: { topic: get/%city%, action: subscribe }
//! ```

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

// ── Enums ────────────────────────────────────────────────────────────

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[serde(alias = "get", alias = "Get")]
    Get,
    #[serde(alias = "post", alias = "Post")]
    Post,
    #[serde(alias = "put", alias = "Put")]
    Put,
    #[serde(alias = "delete", alias = "Delete")]
    Delete,
    #[serde(alias = "patch", alias = "Patch")]
    Patch,
}

impl Method {
    /// Whether requests of this method carry a body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
            Method::Patch => Self::PATCH,
        }
    }
}

/// Structured body encoding used for requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    #[serde(alias = "Json", alias = "JSON")]
    Json,
    #[serde(alias = "Yaml", alias = "YAML", alias = "yml")]
    Yaml,
    #[serde(alias = "Xml", alias = "XML")]
    Xml,
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Xml => "xml",
        })
    }
}

/// How requests of an API are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// No credentials are attached.
    #[default]
    #[serde(alias = "None")]
    None,
    /// Static username/password as HTTP basic auth.
    #[serde(alias = "Basic")]
    Basic,
    /// Fetched token sent as `Authorization: Bearer <token>`.
    #[serde(alias = "Bearer")]
    Bearer,
    /// Fetched token sent in a configured header.
    #[serde(alias = "Header", alias = "header-token", alias = "HeaderToken")]
    Header,
}

/// Direction of the MQTT binding of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqttAction {
    /// Inbound messages on the topic trigger the HTTP call.
    #[serde(alias = "Subscribe")]
    Subscribe,
    /// The HTTP response is published to the topic.
    #[serde(alias = "Publish")]
    Publish,
}

// ── Request / Endpoint ───────────────────────────────────────────────

/// The request-shaped part shared by [`Endpoint`] and [`Authentication`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RequestSpec {
    /// Path relative to the API base URL; may contain `%name%` placeholders.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub method: Method,

    /// Encoding of the response body.
    #[serde(default)]
    pub encoding: BodyEncoding,

    /// Headers specific to this request; override API-wide headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// MQTT side of an endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttBinding {
    /// Topic template relative to the API base topic.
    #[serde(default)]
    pub topic: String,
    pub action: MqttAction,
}

/// One configured REST operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Endpoint {
    #[serde(flatten)]
    pub request: RequestSpec,

    pub mqtt: MqttBinding,

    /// JSONPath selecting the response nodes to publish.
    pub selector: Option<String>,
}

impl Endpoint {
    /// The selector to evaluate, defaulting to the whole document.
    pub fn selector(&self) -> &str {
        self.selector.as_deref().unwrap_or("$")
    }

    /// Whether the endpoint has a usable binding for `action`.
    pub fn is_bound(&self, action: MqttAction) -> bool {
        self.mqtt.action == action && !self.mqtt.topic.is_empty()
    }
}

// ── Authentication ───────────────────────────────────────────────────

/// Authentication scheme of an API, including the login request used to
/// obtain a token for [`AuthType::Bearer`] and [`AuthType::Header`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Authentication {
    #[serde(flatten)]
    pub request: RequestSpec,

    #[serde(rename = "type", default)]
    pub kind: AuthType,

    /// Fields of the login request body.
    #[serde(default)]
    pub body: IndexMap<String, String>,

    /// Encoding of the login request and of its response.
    #[serde(default)]
    pub body_encoding: BodyEncoding,

    /// Where the token sits in the login response.
    #[serde(default)]
    pub token_path: String,

    pub basic_username: Option<String>,
    pub basic_password: Option<SecretString>,

    /// Header carrying the token for [`AuthType::Header`].
    pub header_name: Option<String>,

    /// Root element name of an XML login body.
    #[serde(default = "default_body_root")]
    pub body_root: String,
}

fn default_body_root() -> String {
    "request".into()
}

impl Default for Authentication {
    fn default() -> Self {
        Self {
            request: RequestSpec::default(),
            kind: AuthType::None,
            body: IndexMap::new(),
            body_encoding: BodyEncoding::Json,
            token_path: String::new(),
            basic_username: None,
            basic_password: None,
            header_name: None,
            body_root: default_body_root(),
        }
    }
}

impl Authentication {
    /// Whether this scheme relies on a fetched token.
    pub fn uses_token(&self) -> bool {
        matches!(self.kind, AuthType::Bearer | AuthType::Header)
    }
}

// ── Api ──────────────────────────────────────────────────────────────

/// A named group of endpoints sharing a base URL, base topic and
/// authentication scheme.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Api {
    pub name: String,
    pub base_url: String,
    pub base_topic: String,

    #[serde(default)]
    pub authentication: Authentication,

    #[serde(default)]
    pub endpoints: IndexMap<String, Endpoint>,

    /// Headers sent with every request of this API.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Publish endpoints executed once at startup.
    #[serde(default)]
    pub on_start: Vec<String>,
}

impl Api {
    /// `{base_topic}/{suffix}`
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.base_topic)
    }

    /// The on-demand control topic, `{base_topic}/perform`.
    pub fn control_topic(&self) -> String {
        self.topic("perform")
    }

    pub fn endpoint(&self, key: &str) -> Option<&Endpoint> {
        self.endpoints.get(key)
    }

    /// Endpoints whose inbound topic triggers a call, in registration order.
    pub fn subscribe_endpoints(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.endpoints
            .iter()
            .filter(|(_, e)| e.is_bound(MqttAction::Subscribe))
            .map(|(k, e)| (k.as_str(), e))
    }

    /// Publish endpoints listed in `on-start`.
    pub fn on_start_endpoints(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.endpoints
            .iter()
            .filter(|(k, e)| e.is_bound(MqttAction::Publish) && self.on_start.contains(k))
            .map(|(k, e)| (k.as_str(), e))
    }
}
