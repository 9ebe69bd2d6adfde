//! Jira connection profiles.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Result};

/// A Jira profile configuration.
///
/// API tokens are not part of the profile; they come from the environment
/// or the OS keyring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// The name of this profile.
    ///
    /// Must be non-empty and unique across all profiles.
    pub name: String,

    /// The Jira instance URL (e.g., "https://company.atlassian.net").
    pub url: String,

    /// The user's email address, used with the API token for Basic Auth.
    pub email: String,

    /// Project key the profile works in by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl Profile {
    pub fn new(name: String, url: String, email: String) -> Self {
        Self {
            name,
            url,
            email,
            project: None,
        }
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }

    /// Validate this profile.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` with details if validation fails.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name cannot be empty".to_string(),
            ));
        }

        if self.name.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "profile name '{}' cannot contain whitespace",
                self.name
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL cannot be empty",
                self.name
            )));
        }

        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': URL must start with http:// or https://",
                self.name
            )));
        }

        if !self.email.contains('@') {
            return Err(ConfigError::ValidationError(format!(
                "profile '{}': '{}' does not appear to be a valid email address",
                self.name, self.email
            )));
        }

        if let Some(project) = &self.project {
            if project.is_empty() || !project.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::ValidationError(format!(
                    "profile '{}': '{}' is not a valid project key",
                    self.name, project
                )));
            }
        }

        Ok(())
    }
}
