//! API error types for the Jira and Xray invocation layer.

use thiserror::Error;

/// Errors that can occur when talking to the Jira or Xray APIs.
///
/// Remote failures expressed as an HTTP status are normally carried inside a
/// [`Reply`](super::Reply) envelope rather than raised; the status variants
/// here are used by facades that need a typed failure out of a reply.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed - invalid email or API token.
    #[error("Authentication failed: check your email and API token")]
    Unauthorized,

    /// Permission denied - user lacks access to the resource.
    #[error("Permission denied: you don't have access to this resource")]
    Forbidden,

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limited by the remote API.
    #[error("Rate limited: please wait before retrying")]
    RateLimited,

    /// Remote server error.
    #[error("Server error: {0}")]
    ServerError(String),

    /// The remote API rejected the request (other 4xx statuses).
    #[error("Request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A command route was absolute or malformed.
    #[error("Invalid route '{0}': routes must be relative and start with '/'")]
    InvalidRoute(String),

    /// No session token could be obtained for the secondary API.
    #[error("Xray session unavailable for issue {0}")]
    SessionUnavailable(String),

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Keyring error when storing/retrieving tokens.
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error from an HTTP status code.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(context.to_string()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(format!("HTTP {}: {}", status, context)),
            _ => ApiError::Rejected {
                status,
                message: context.to_string(),
            },
        }
    }

    /// Check if this error is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited | ApiError::ServerError(_) | ApiError::Network(_)
        )
    }
}
