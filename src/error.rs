//! Centralized error types for xray-tms.
//!
//! Each layer has its own `thiserror` enum; [`AppError`] aggregates them and
//! maps every failure to a message suitable for a tool caller.

use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::ConfigError;
use crate::orchestration::DomainError;

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Failures of composite operations.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// IO errors (definition files, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A definition file could not be parsed.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::CreateDirError(_) => {
                    "Could not create configuration directory. Check file permissions.".to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file exists and is readable.".to_string()
                }
                ConfigError::WriteError(_) => {
                    "Could not save configuration. Please check file permissions.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::SerializeError(_) => {
                    "Could not save configuration. Internal error.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::ProfileNotFound(name) => format!("Profile '{}' not found.", name),
            },
            AppError::Api(e) => api_message(e),
            AppError::Domain(e) => match e {
                DomainError::MissingIdentity { .. } => {
                    "Jira did not return the created issue. Check the raw response in 'data'."
                        .to_string()
                }
                DomainError::FolderNotFound(path) => {
                    format!("Folder '{}' does not exist in the test repository.", path)
                }
                DomainError::TestNotFound(key) => format!("Issue '{}' was not found.", key),
                DomainError::NoTestsMatched(selection) => {
                    format!("No tests matched '{}'.", selection)
                }
                DomainError::InvalidDefinition(msg) => format!("Invalid definition: {}", msg),
                DomainError::Api(e) => api_message(e),
            },
            AppError::Io(_) => "A file operation failed. Please check the path and permissions.".to_string(),
            AppError::Json(e) => format!("The definition is not valid JSON: {}", e),
            AppError::Other(msg) => msg.clone(),
        }
    }

    /// Check if the same call may succeed when repeated later.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Api(e) | AppError::Domain(DomainError::Api(e)) => e.is_transient(),
            _ => false,
        }
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        let api = match self {
            AppError::Api(e) | AppError::Domain(DomainError::Api(e)) => e,
            AppError::Config(ConfigError::NoConfigDir)
            | AppError::Config(ConfigError::ReadError(_)) => {
                return Some("Create a config.toml with at least one [[profiles]] entry.")
            }
            _ => return None,
        };
        match api {
            ApiError::Unauthorized | ApiError::Keyring(_) => {
                Some("Run 'xray-tms login' to store an API token, or set XRAY_TMS_TOKEN.")
            }
            ApiError::SessionUnavailable(_) => {
                Some("Check that the Xray app is installed and the issue key exists.")
            }
            ApiError::RateLimited => Some("Wait a few seconds and try again."),
            ApiError::Network(_) => Some("Check your internet connection and Jira URL."),
            _ => None,
        }
    }
}

fn api_message(e: &ApiError) -> String {
    match e {
        ApiError::Unauthorized => {
            "Authentication failed. Please check your email and API token.".to_string()
        }
        ApiError::Forbidden => {
            "Access denied. You don't have permission to access this resource.".to_string()
        }
        ApiError::NotFound(resource) => format!("'{}' was not found.", resource),
        ApiError::RateLimited => "Too many requests. Please wait a moment and try again.".to_string(),
        ApiError::ServerError(_) => "Jira or Xray server error. Please try again later.".to_string(),
        ApiError::Rejected { status, message } => {
            format!("The request was rejected (HTTP {}): {}", status, message)
        }
        ApiError::Network(_) => "Connection failed. Please check your internet connection.".to_string(),
        ApiError::InvalidRoute(route) => format!("'{}' is not a valid API route.", route),
        ApiError::SessionUnavailable(key) => {
            format!("Could not open an Xray session for '{}'.", key)
        }
        ApiError::InvalidResponse(_) => "Unexpected response from the server. Please try again.".to_string(),
        ApiError::Keyring(_) => {
            "Could not access secure storage. Please log in again.".to_string()
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_from_config_error() {
        let app_err: AppError = ConfigError::NoConfigDir.into();
        assert!(matches!(app_err, AppError::Config(ConfigError::NoConfigDir)));
    }

    #[test]
    fn test_app_error_from_domain_error() {
        let app_err: AppError = DomainError::FolderNotFound("/Smoke".to_string()).into();
        assert_eq!(app_err.to_string(), "folder '/Smoke' not found");
        assert!(app_err.user_message().contains("/Smoke"));
    }

    #[test]
    fn test_user_message_unauthorized() {
        let msg = AppError::Api(ApiError::Unauthorized).user_message();
        assert!(msg.contains("Authentication failed"));
        assert!(msg.contains("API token"));
    }

    #[test]
    fn test_user_message_nested_api_error() {
        let err = AppError::Domain(DomainError::Api(ApiError::NotFound("DEMO-9".to_string())));
        assert_eq!(err.user_message(), "'DEMO-9' was not found.");
    }

    #[test]
    fn test_user_message_session_unavailable() {
        let err = AppError::Api(ApiError::SessionUnavailable("DEMO-1".to_string()));
        assert!(err.user_message().contains("DEMO-1"));
        assert!(err.suggested_action().unwrap().contains("Xray"));
    }

    #[test]
    fn test_user_message_config_validation() {
        let err = AppError::Config(ConfigError::ValidationError("duplicate profile".to_string()));
        assert!(err.user_message().contains("duplicate profile"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(AppError::Api(ApiError::RateLimited).is_recoverable());
        assert!(AppError::Domain(DomainError::Api(ApiError::ServerError("x".into()))).is_recoverable());
        assert!(!AppError::Api(ApiError::Unauthorized).is_recoverable());
        assert!(!AppError::Domain(DomainError::FolderNotFound("/".into())).is_recoverable());
    }

    #[test]
    fn test_suggested_action_unauthorized() {
        let action = AppError::Api(ApiError::Unauthorized).suggested_action();
        assert!(action.unwrap().contains("login"));
    }

    #[test]
    fn test_other_error() {
        let err = AppError::other("something went wrong");
        assert_eq!(err.user_message(), "something went wrong");
    }
}
