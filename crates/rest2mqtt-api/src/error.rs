use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Top-level error type for the `rest2mqtt-api` crate.
///
/// Covers every failure mode of a single endpoint call: building the
/// request, talking HTTP, authenticating, and decoding the response.
/// `rest2mqtt-core` wraps these and decides what is retried.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP status ─────────────────────────────────────────────────
    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    // ── Configuration ───────────────────────────────────────────────
    /// A configured header name or value is not valid HTTP.
    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    /// The endpoint declares an encoding this operation cannot handle.
    #[error("Unsupported encoding {encoding} for {operation}")]
    UnsupportedEncoding {
        encoding: crate::BodyEncoding,
        operation: &'static str,
    },

    /// The token path matched nothing in the login response.
    #[error("Token path '{path}' matched nothing in the login response of api '{api}'")]
    TokenNotFound { api: String, path: String },

    /// A selector or token path could not be parsed.
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A body could not be encoded or decoded.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    // ── Persistence ─────────────────────────────────────────────────
    /// Reading or writing a token file failed.
    #[error("Token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if the endpoint rejected the call with HTTP 401,
    /// meaning a fresh login might resolve it.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Returns `true` for errors caused by the configuration itself.
    /// These are never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::InvalidHeader { .. }
                | Self::UnsupportedEncoding { .. }
                | Self::TokenNotFound { .. }
                | Self::Selector { .. }
        )
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}
