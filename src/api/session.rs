//! Xray session tokens.
//!
//! Xray authorizes its internal API per issue. A token scoped to one issue is
//! obtained from Jira's internal GraphQL route: the response carries an
//! `options` fragment (at a depth that varies between Jira versions) which is
//! itself a JSON document holding the `contextJwt` field.
//!
//! Tokens are cached per issue key until shortly before their `exp` claim.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use super::auth::AuthContext;
use super::factory::jira;
use super::invoker::send;

/// Field of the `options` fragment that holds the token.
const TOKEN_FIELD: &str = "contextJwt";

/// Lifetime assumed for tokens whose claims cannot be read.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// A cached token is treated as stale this long before it expires.
const EXPIRY_SLACK: Duration = Duration::from_secs(30);

/// A session token and its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    /// When the token was acquired (Unix timestamp).
    pub acquired_at: u64,
    /// When the token expires (Unix timestamp).
    pub expires_at: u64,
}

impl SessionToken {
    /// Wrap a freshly acquired token, reading its expiry from the JWT claims.
    pub fn new(token: String, acquired_at: u64) -> Self {
        let expires_at = jwt_expiry(&token)
            .unwrap_or(acquired_at + DEFAULT_TOKEN_LIFETIME.as_secs());
        Self {
            token,
            acquired_at,
            expires_at,
        }
    }

    /// Check whether the token can still be used at `now`.
    pub fn is_fresh_at(&self, now: u64) -> bool {
        now + EXPIRY_SLACK.as_secs() < self.expires_at
    }
}

/// Resolves and caches Xray session tokens.
///
/// Clones share the same cache.
#[derive(Debug, Clone)]
pub struct SessionResolver {
    client: Client,
    context: AuthContext,
    cache: Arc<RwLock<HashMap<String, SessionToken>>>,
}

impl SessionResolver {
    pub fn new(client: Client, context: AuthContext) -> Self {
        Self {
            client,
            context,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a token scoped to `issue_key`.
    ///
    /// Returns an empty string when no token could be obtained; callers must
    /// treat that as "session unavailable".
    #[instrument(skip(self), fields(issue_key = %issue_key))]
    pub async fn resolve(&self, issue_key: &str) -> String {
        let now = unix_now();
        if let Some(cached) = self.cached(issue_key, now) {
            trace!("Session token cache hit");
            return cached;
        }

        match self.fetch(issue_key).await {
            Some(token) => {
                debug!("Acquired Xray session token");
                let entry = SessionToken::new(token.clone(), now);
                if let Ok(mut cache) = self.cache.write() {
                    cache.retain(|_, cached| cached.is_fresh_at(now));
                    cache.insert(issue_key.to_string(), entry);
                }
                token
            }
            None => String::new(),
        }
    }

    /// Drop the cached token for one issue.
    pub fn invalidate(&self, issue_key: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(issue_key);
        }
    }

    /// Drop every cached token.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn cached(&self, issue_key: &str, now: u64) -> Option<String> {
        let cache = self.cache.read().ok()?;
        cache
            .get(issue_key)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| entry.token.clone())
    }

    async fn fetch(&self, issue_key: &str) -> Option<String> {
        let command = match jira::session_query(project_of(issue_key), issue_key) {
            Ok(command) => command,
            Err(e) => {
                warn!("Cannot build session query: {}", e);
                return None;
            }
        };

        let reply = match send(
            &self.client,
            &self.context.base_url,
            Some(self.context.auth.header_value()),
            command,
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Session query failed: {}", e);
                return None;
            }
        };

        if !reply.is_success() {
            warn!(status = reply.status(), "Session query rejected");
            return None;
        }

        let token = extract_token(reply.value());
        if token.is_none() {
            warn!("Session query response carried no {}", TOKEN_FIELD);
        }
        token
    }
}

/// The project key prefix of an issue key (`DEMO-12` -> `DEMO`).
pub fn project_of(issue_key: &str) -> &str {
    issue_key
        .rsplit_once('-')
        .map(|(project, _)| project)
        .unwrap_or(issue_key)
}

/// Find the token inside a session query response.
///
/// Searches depth-first for an `options` member, which may be either an
/// embedded JSON string or an object, and reads [`TOKEN_FIELD`] from it.
pub fn extract_token(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(options) = map.get("options") {
                let parsed = match options {
                    Value::String(s) => serde_json::from_str::<Value>(s).ok(),
                    other => Some(other.clone()),
                };
                let token = parsed
                    .as_ref()
                    .and_then(|o| o.get(TOKEN_FIELD))
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty());
                if let Some(token) = token {
                    return Some(token.to_string());
                }
            }
            map.values().find_map(extract_token)
        }
        Value::Array(items) => items.iter().find_map(extract_token),
        _ => None,
    }
}

/// Read the `exp` claim of a JWT without verifying it.
fn jwt_expiry(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_u64()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
