use std::time::Duration;

use bridge_traits::{BridgeError, HttpResponse};
use thiserror::Error;

use crate::types::ApiEnvelope;

pub const ERROR_CODE_TIMEOUT: &str = "TIMEOUT";
pub const ERROR_CODE_NETWORK: &str = "NETWORK_ERROR";
pub const ERROR_CODE_UNKNOWN: &str = "UNKNOWN_ERROR";

/// Failures surfaced by [`ApiClient`](crate::client::ApiClient).
///
/// Business failures reported inside a 2xx envelope (`success: false`) are
/// not errors; they come back as ordinary [`ApiEnvelope`] values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    /// A 401 that survived refresh handling.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        error_code: Option<String>,
    },

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Request could not be sent: {0}")]
    Transport(String),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Failure envelope suitable for showing to a user.
    ///
    /// Server-provided messages win. Transport failures get fixed messages
    /// and the `TIMEOUT` / `NETWORK_ERROR` / `UNKNOWN_ERROR` codes.
    pub fn to_envelope<T>(&self) -> ApiEnvelope<T> {
        match self {
            ApiError::Timeout(_) => ApiEnvelope::failure(
                "Request timeout. Please try again.",
                Some(ERROR_CODE_TIMEOUT.to_string()),
            ),
            ApiError::Network(_) => ApiEnvelope::failure(
                "Network error. Please check your connection.",
                Some(ERROR_CODE_NETWORK.to_string()),
            ),
            ApiError::Unauthorized { message } => ApiEnvelope::failure(message.clone(), None),
            ApiError::Status {
                message,
                error_code,
                ..
            } => ApiEnvelope::failure(message.clone(), error_code.clone()),
            ApiError::Decode(_) | ApiError::Transport(_) => ApiEnvelope::failure(
                "An unexpected error occurred",
                Some(ERROR_CODE_UNKNOWN.to_string()),
            ),
        }
    }

    pub(crate) fn from_bridge(error: BridgeError) -> Self {
        match error {
            BridgeError::Timeout(deadline) => ApiError::Timeout(deadline),
            BridgeError::Network(message) => ApiError::Network(message),
            other => ApiError::Transport(other.to_string()),
        }
    }

    /// Builds an error from a non-2xx response, preferring the server's
    /// `message` (or FastAPI-style `detail`) over a generic one.
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        let body: Option<serde_json::Value> = serde_json::from_slice(&response.body).ok();
        let field = |name: &str| {
            body.as_ref()
                .and_then(|b| b.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let message = field("message")
            .or_else(|| field("detail"))
            .unwrap_or_else(|| format!("Request failed with status {}", response.status));

        if response.is_unauthorized() {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Status {
                status: response.status,
                message,
                error_code: field("error_code"),
            }
        }
    }
}

/// Errors returned by the session facade and the sessions API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Guest users cannot access this resource")]
    GuestNotAllowed,

    /// The server answered 2xx with `success: false`.
    #[error("{message}")]
    Rejected {
        message: String,
        error_code: Option<String>,
    },

    #[error("Session not found or already logged out")]
    SessionNotFound(i64),

    #[error("{0}")]
    Forbidden(String),

    /// The server no longer accepts this client's credentials.
    #[error("{0}")]
    SessionExpired(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    pub(crate) fn rejected(message: impl Into<String>, error_code: Option<String>) -> Self {
        AuthError::Rejected {
            message: message.into(),
            error_code,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
