//! Configuration management.
//!
//! The configuration file lives at `<config dir>/xray-tms/config.toml` and
//! holds the tuning [`Settings`] plus one or more Jira [`Profile`]s. API
//! tokens are read from `XRAY_TMS_TOKEN` or the OS keyring, never from the
//! file.

mod profile;
mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use profile::Profile;
pub use settings::{Settings, DEFAULT_XRAY_BASE_URL};

/// Environment variable that overrides the keyring token.
pub const TOKEN_ENV_VAR: &str = "XRAY_TMS_TOKEN";

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    NoConfigDir,

    #[error("failed to create configuration directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("failed to read configuration file: {0}")]
    ReadError(std::io::Error),

    #[error("failed to write configuration file: {0}")]
    WriteError(std::io::Error),

    #[error("invalid configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("{0}")]
    ValidationError(String),

    #[error("profile '{0}' not found")]
    ProfileNotFound(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// The default configuration file path.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("xray-tms").join("config.toml"))
    }

    /// Load the configuration from the default path.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(ConfigError::WriteError)
    }

    /// Check every profile and reject duplicate names.
    pub fn validate(&self) -> Result<()> {
        for (i, profile) in self.profiles.iter().enumerate() {
            profile.validate()?;
            if self.profiles[..i].iter().any(|p| p.name == profile.name) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate profile name '{}'",
                    profile.name
                )));
            }
        }
        Ok(())
    }

    /// Pick a profile by name, falling back to the default profile and then
    /// to the only profile.
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile> {
        let wanted = name.or(self.settings.default_profile.as_deref());
        match wanted {
            Some(name) => self
                .profiles
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string())),
            None => match self.profiles.as_slice() {
                [only] => Ok(only),
                _ => Err(ConfigError::ValidationError(
                    "no profile selected: pass --profile or set settings.default_profile"
                        .to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[settings]
default_profile = "work"
max_parallel = 8

[[profiles]]
name = "work"
url = "https://company.atlassian.net"
email = "qa@company.com"
project = "DEMO"

[[profiles]]
name = "staging"
url = "https://staging.atlassian.net"
email = "qa@company.com"
"#;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_and_select_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.settings.max_parallel, 8);
        assert_eq!(config.settings.retry_attempts, 3);
        assert_eq!(config.profile(None).unwrap().project.as_deref(), Some("DEMO"));
        assert_eq!(config.profile(Some("staging")).unwrap().project, None);
        assert!(matches!(
            config.profile(Some("prod")),
            Err(ConfigError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_profiles_rejected() {
        let profile = Profile::new(
            "work".to_string(),
            "https://company.atlassian.net".to_string(),
            "qa@company.com".to_string(),
        );
        let config = Config {
            settings: Settings::default(),
            profiles: vec![profile.clone(), profile],
        };
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            settings: Settings::default(),
            profiles: vec![Profile::new(
                "work".to_string(),
                "https://company.atlassian.net".to_string(),
                "qa@company.com".to_string(),
            )
            .with_project("DEMO")],
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[[profiles]\nname=").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
