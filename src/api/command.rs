//! Declarative description of one outbound request.
//!
//! A [`Command`] names a route relative to a base address, a [`Verb`], an
//! optional [`Body`] and optional headers. Commands are built by the
//! factories in [`super::factory`] and consumed once by the
//! [`CommandInvoker`](super::CommandInvoker).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use super::error::{ApiError, Result};

/// Header that marks a command as addressed to the Xray API.
///
/// The value set by a factory is the issue key that scopes the session; the
/// invoker replaces it with the resolved session token before sending.
pub const SESSION_HEADER: &str = "X-acpt";

/// HTTP verb of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    /// The uppercase wire name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            other => Err(format!("unsupported verb '{}'", other)),
        }
    }
}

/// Request payload of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A JSON document, serialized on send.
    Json(Value),
    /// Text that is already JSON (or plain text) and is sent verbatim.
    Raw(String),
    /// A single file uploaded as multipart form data.
    Multipart {
        file_name: String,
        bytes: Vec<u8>,
        mime: String,
    },
}

/// One outbound request.
///
/// Fields are private: once built, a command is only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    route: String,
    verb: Verb,
    body: Option<Body>,
    headers: BTreeMap<String, String>,
}

impl Command {
    /// Create a command for `verb` on `route`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRoute`] if the route is absolute or does not
    /// start with `/`.
    pub fn new(verb: Verb, route: impl Into<String>) -> Result<Self> {
        let route = route.into();
        if !route.starts_with('/') || route.contains("://") {
            return Err(ApiError::InvalidRoute(route));
        }
        Ok(Self {
            route,
            verb,
            body: None,
            headers: BTreeMap::new(),
        })
    }

    pub fn get(route: impl Into<String>) -> Result<Self> {
        Self::new(Verb::Get, route)
    }

    pub fn post(route: impl Into<String>) -> Result<Self> {
        Self::new(Verb::Post, route)
    }

    pub fn put(route: impl Into<String>) -> Result<Self> {
        Self::new(Verb::Put, route)
    }

    pub fn delete(route: impl Into<String>) -> Result<Self> {
        Self::new(Verb::Delete, route)
    }

    /// Attach a JSON body built from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidResponse`] if the value cannot be
    /// represented as JSON.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("unserializable body: {}", e)))?;
        self.body = Some(Body::Json(value));
        Ok(self)
    }

    /// Attach a body that is sent as-is.
    pub fn with_raw(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Body::Raw(body.into()));
        self
    }

    /// Attach a file upload.
    pub fn with_file(mut self, file_name: &str, bytes: Vec<u8>, mime: &str) -> Self {
        self.body = Some(Body::Multipart {
            file_name: file_name.to_string(),
            bytes,
            mime: mime.to_string(),
        });
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    /// Route this command to the Xray API under the session of `issue_key`.
    pub fn with_session_scope(self, issue_key: &str) -> Self {
        self.with_header(SESSION_HEADER, issue_key)
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The issue key the command is session-scoped to, if any.
    ///
    /// An empty header value counts as unscoped.
    pub fn session_scope(&self) -> Option<&str> {
        self.headers
            .get(SESSION_HEADER)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Split the command into the parts the invoker sends.
    pub(crate) fn into_parts(self) -> (String, Verb, Option<Body>, BTreeMap<String, String>) {
        (self.route, self.verb, self.body, self.headers)
    }
}
