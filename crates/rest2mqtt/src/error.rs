//! CLI error types with miette diagnostics.
//!
//! Maps configuration and bridge failures into user-facing errors with
//! actionable help text and distinct exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use rest2mqtt_api::Error as ApiError;
use rest2mqtt_config::ConfigError;
use rest2mqtt_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 4;
    pub const AUTH: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(rest2mqtt::config_not_found),
        help(
            "Create a config.yml in the working directory,\n\
             or point to one with --config / REST2MQTT_CONFIG."
        )
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rest2mqtt::validation))]
    Validation { field: String, reason: String },

    #[error("Could not load configuration")]
    #[diagnostic(code(rest2mqtt::config))]
    Config(#[source] Box<figment::Error>),

    // ── Bridge ───────────────────────────────────────────────────────
    #[error("Could not reach the MQTT broker or an API")]
    #[diagnostic(
        code(rest2mqtt::connection),
        help("Check broker host/port and the API base URLs in the configuration.")
    )]
    Connection(#[source] CoreError),

    #[error("Authentication failed")]
    #[diagnostic(
        code(rest2mqtt::auth_failed),
        help("Verify the authentication section of the API in the configuration.")
    )]
    AuthFailed(#[source] CoreError),

    #[error(transparent)]
    #[diagnostic(code(rest2mqtt::bridge))]
    Bridge(CoreError),

    // ── Process ──────────────────────────────────────────────────────
    #[error("Could not listen for the shutdown signal")]
    #[diagnostic(code(rest2mqtt::signal))]
    Signal(#[source] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::ConfigNotFound { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Bridge(e) if e.is_configuration() => exit_code::CONFIG,
            Self::Connection(_) => exit_code::CONNECTION,
            Self::AuthFailed(_) => exit_code::AUTH,
            Self::Bridge(_) | Self::Signal(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::ConfigNotFound { path },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Figment(e) => Self::Config(e),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::Api(e) if e.is_unauthorized() => Self::AuthFailed(err),
            CoreError::Api(ApiError::Transport(_) | ApiError::Tls(_)) | CoreError::Mqtt(_) => {
                Self::Connection(err)
            }
            _ => Self::Bridge(err),
        }
    }
}
