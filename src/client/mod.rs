//! High-level client facades.
//!
//! [`JiraClient`] and [`XrayClient`] share one [`CommandInvoker`] (and with
//! it the HTTP connection pool and the session token cache). [`Clients`]
//! builds both from a profile.

mod jira;
mod xray;

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{
    auth, with_retry, ApiError, Auth, AuthContext, Command, CommandInvoker, Reply, Result,
    RetryPolicy,
};
use crate::cache::MetadataCache;
use crate::config::{Profile, Settings, TOKEN_ENV_VAR};

pub use jira::{JiraClient, DEFAULT_SEARCH_FIELDS};
pub use xray::XrayClient;

/// Send `command` through the retry wrapper.
pub(crate) async fn invoke_with_retry(
    invoker: &CommandInvoker,
    policy: &RetryPolicy,
    operation: &str,
    command: Command,
) -> Result<Reply> {
    with_retry(policy, operation, move || invoker.invoke(command.clone())).await
}

/// Both facades over one invoker.
#[derive(Debug, Clone)]
pub struct Clients {
    pub jira: JiraClient,
    pub xray: XrayClient,
    pub settings: Settings,
}

impl Clients {
    /// Build the facades for an authentication context.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(context: AuthContext, settings: &Settings) -> Result<Self> {
        let invoker = CommandInvoker::new(
            context,
            &settings.xray_base_url,
            settings.request_timeout(),
        )?;
        Ok(Self::with_invoker(Arc::new(invoker), settings))
    }

    /// Build the facades over an existing invoker, with a metadata cache of
    /// their own.
    pub fn with_invoker(invoker: Arc<CommandInvoker>, settings: &Settings) -> Self {
        Self::with_metadata(invoker, settings, MetadataCache::new())
    }

    /// Build the facades over an existing invoker and metadata cache.
    ///
    /// Bundles given clones of one [`MetadataCache`] share its entries.
    pub fn with_metadata(
        invoker: Arc<CommandInvoker>,
        settings: &Settings,
        metadata: MetadataCache,
    ) -> Self {
        Self {
            jira: JiraClient::new(invoker.clone(), settings, metadata),
            xray: XrayClient::new(invoker, settings),
            settings: settings.clone(),
        }
    }

    /// Build the facades for a configured profile.
    ///
    /// The API token is taken from `XRAY_TMS_TOKEN` when set, otherwise from
    /// the OS keyring entry of the profile.
    pub fn from_profile(profile: &Profile, settings: &Settings) -> Result<Self> {
        info!(profile = %profile.name, "Creating clients for profile");
        let auth = match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.is_empty() => {
                debug!("Using API token from {}", TOKEN_ENV_VAR);
                Auth::new(&profile.email, &token)
            }
            _ => Auth::from_keyring(&profile.name, &profile.email)?,
        };
        let context = AuthContext::new(&profile.url, auth, profile.project.clone());
        Self::new(context, settings)
    }

    /// The project key of the context, or an error if none is configured.
    pub fn default_project(&self) -> Result<&str> {
        self.jira
            .invoker()
            .context()
            .project
            .as_deref()
            .ok_or_else(|| ApiError::InvalidResponse("no project configured".to_string()))
    }

    /// Store an API token for a profile in the OS keyring.
    pub fn store_token(profile: &Profile, token: &str) -> Result<()> {
        auth::store_token(&profile.name, token)
    }

    pub fn delete_token(profile: &Profile) -> Result<()> {
        auth::delete_token(&profile.name)
    }
}

#[cfg(test)]
impl Clients {
    /// Clients against mock servers, with a fast retry policy.
    pub(crate) fn for_tests(jira: &wiremock::MockServer, xray: &wiremock::MockServer) -> Self {
        let settings = Settings {
            retry_delay_ms: 1,
            xray_base_url: xray.uri(),
            ..Settings::default()
        };
        let context = AuthContext::new(
            &jira.uri(),
            Auth::new("qa@company.com", "token"),
            Some("DEMO".to_string()),
        );
        Self::new(context, &settings).unwrap()
    }

    /// Clients that are never expected to send anything.
    pub(crate) fn offline(base_url: &str) -> Self {
        let context = AuthContext::new(base_url, Auth::new("qa@company.com", "token"), None);
        Self::new(context, &Settings::default()).unwrap()
    }
}
