//! Gateway error types.

use homepage_core::{AppError, ConfigError, NetworkError, ReqwestErrorExt};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Jsonp(#[from] JsonpError),

    /// The payload parsed but lacks a field we read from it.
    #[error("Unexpected response shape: {0}")]
    Structure(String),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failures of a single JSONP exchange.
#[derive(Error, Debug)]
pub enum JsonpError {
    #[error("JSONP request failed: {url} ({reason})")]
    LoadFailed { url: String, reason: String },

    #[error("JSONP script is not a callback invocation: {0}")]
    MalformedScript(String),

    #[error("JSONP callback {0} was never invoked")]
    CallbackNotInvoked(String),

    #[error("JSONP callback {0} is already pending")]
    TokenCollision(String),
}

impl GatewayError {
    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    /// Whether the failure happened before any payload was received.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Status { .. }
                | Self::Jsonp(JsonpError::LoadFailed { .. })
        )
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(e) => AppError::Network(e.into_network_error()),
            GatewayError::Status { status, url } => AppError::Network(NetworkError::ServerError {
                status,
                message: url,
            }),
            GatewayError::Jsonp(JsonpError::LoadFailed { url, reason }) => {
                AppError::Network(NetworkError::ConnectionFailed(format!("{}: {}", url, reason)))
            }
            GatewayError::Parse(e) => AppError::Network(NetworkError::InvalidResponse(e.to_string())),
            GatewayError::NotConfigured(setting) => {
                AppError::Config(ConfigError::MissingSetting(setting.to_string()))
            }
            GatewayError::InvalidUrl(e) => AppError::Config(ConfigError::Invalid(e.to_string())),
            other @ (GatewayError::Jsonp(_) | GatewayError::Structure(_)) => {
                AppError::Provider(other.to_string())
            }
        }
    }
}
