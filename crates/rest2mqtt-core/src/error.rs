// ── Core error types ──
//
// Errors surfaced by the bridging engine. API-level failures are wrapped
// transparently so callers can still ask `is_unauthorized()` or
// `is_configuration()` on the inner error.

use rest2mqtt_api::Error as ApiError;
use thiserror::Error;

use crate::topic::TopicError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Endpoint execution ───────────────────────────────────────────
    #[error(transparent)]
    Api(#[from] ApiError),

    // ── Routing ──────────────────────────────────────────────────────
    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error("Unknown api '{name}'")]
    UnknownApi { name: String },

    #[error("Unknown endpoint '{endpoint}' in api '{api}'")]
    UnknownEndpoint { api: String, endpoint: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("MQTT client error: {0}")]
    Mqtt(Box<rumqttc::ClientError>),

    // ── Publication ──────────────────────────────────────────────────
    #[error("Cannot serialize selected node: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Bridge already started")]
    AlreadyStarted,

    #[error("Startup cancelled")]
    Cancelled,
}

impl From<rumqttc::ClientError> for CoreError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Mqtt(Box::new(err))
    }
}

impl CoreError {
    /// Returns `true` for errors caused by the configuration, which are
    /// never worth retrying.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Api(e) => e.is_configuration(),
            Self::Topic(_) | Self::UnknownApi { .. } | Self::UnknownEndpoint { .. } => true,
            _ => false,
        }
    }
}
