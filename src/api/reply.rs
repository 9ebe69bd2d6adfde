//! Normalized result of one command.

use serde_json::{json, Value};

use super::error::{ApiError, Result};
use super::retry::FAILURE_THRESHOLD;

/// Identifier placed in synthesized envelopes.
pub const SENTINEL_ID: &str = "-1";

/// The normalized outcome of an HTTP exchange.
///
/// `value` is always parseable JSON: the response body when the remote
/// returned one with a status below 400, otherwise an envelope of the form
/// `{"statusCode", "reasonPhrase", "body", "id": "-1"}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: u16,
    reason: String,
    value: Value,
}

impl Reply {
    /// Normalize a raw HTTP exchange.
    pub fn from_http(status: u16, reason: &str, body: &str) -> Self {
        let value = if is_success_status(status) && !body.trim().is_empty() {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        } else {
            envelope(status, reason, body)
        };

        Self {
            status,
            reason: reason.to_string(),
            value,
        }
    }

    /// A synthesized 404 reply, used when a request could not be dispatched.
    pub fn not_found(message: &str) -> Self {
        Self {
            status: 404,
            reason: "Not Found".to_string(),
            value: envelope(404, "Not Found", message),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Turn a failed reply into a typed error.
    ///
    /// Jira's `errorMessages` and `errors` fields are lifted into the error
    /// message when present.
    pub fn into_result(self, context: &str) -> Result<Value> {
        if self.is_success() {
            return Ok(self.value);
        }

        let body = self.value.get("body").and_then(Value::as_str).unwrap_or("");
        let detail = remote_error_detail(body).unwrap_or_else(|| context.to_string());
        Err(ApiError::from_status(self.status, &detail))
    }
}

/// Statuses below the retry failure threshold count as success.
fn is_success_status(status: u16) -> bool {
    status < FAILURE_THRESHOLD
}

/// Build the envelope returned for empty bodies and failures.
fn envelope(status: u16, reason: &str, body: &str) -> Value {
    json!({
        "statusCode": status,
        "reasonPhrase": reason,
        "body": body,
        "id": SENTINEL_ID,
    })
}

/// Extract a human-readable message from a Jira error body.
fn remote_error_detail(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;

    if let Some(arr) = json.get("errorMessages").and_then(Value::as_array) {
        let messages: Vec<_> = arr.iter().filter_map(|v| v.as_str()).collect();
        if !messages.is_empty() {
            return Some(messages.join(", "));
        }
    }

    if let Some(obj) = json.get("errors").and_then(Value::as_object) {
        let errors: Vec<String> = obj.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
        if !errors.is_empty() {
            return Some(errors.join(", "));
        }
    }

    // Xray reports failures as {"error": "..."}
    json.get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_body_is_parsed() {
        let reply = Reply::from_http(201, "Created", r#"{"id":"10001","key":"DEMO-1"}"#);
        assert!(reply.is_success());
        assert_eq!(reply.value()["key"], "DEMO-1");
    }

    #[test]
    fn test_non_json_success_body_kept_as_string() {
        let reply = Reply::from_http(200, "OK", "done");
        assert_eq!(reply.value(), &Value::String("done".to_string()));
    }

    #[test]
    fn test_empty_success_body_synthesizes_envelope() {
        let reply = Reply::from_http(204, "No Content", "");
        assert!(reply.is_success());
        assert_eq!(reply.value()["statusCode"], 204);
        assert_eq!(reply.value()["reasonPhrase"], "No Content");
        assert_eq!(reply.value()["id"], SENTINEL_ID);
    }

    #[test]
    fn test_unfollowed_redirect_counts_as_success() {
        let with_body = Reply::from_http(302, "Found", r#"{"location":"/rest/api/3/issue/1"}"#);
        assert!(with_body.is_success());
        assert_eq!(with_body.value()["location"], "/rest/api/3/issue/1");

        let empty = Reply::from_http(304, "Not Modified", "");
        assert!(empty.is_success());
        assert_eq!(empty.value()["statusCode"], 304);
        assert_eq!(empty.value()["id"], SENTINEL_ID);
    }

    #[test]
    fn test_failure_synthesizes_envelope() {
        let reply = Reply::from_http(400, "Bad Request", r#"{"errorMessages":["bad jql"]}"#);
        assert!(!reply.is_success());
        assert_eq!(reply.value()["statusCode"], 400);
        assert_eq!(reply.value()["body"], r#"{"errorMessages":["bad jql"]}"#);
        assert_eq!(reply.value()["id"], "-1");
    }

    #[test]
    fn test_into_result_lifts_jira_messages() {
        let reply = Reply::from_http(
            400,
            "Bad Request",
            r#"{"errorMessages":[],"errors":{"summary":"required"}}"#,
        );
        let err = reply.into_result("create issue").unwrap_err();
        assert!(err.to_string().contains("summary"));
    }

    #[test]
    fn test_into_result_uses_context_without_detail() {
        let err = Reply::from_http(404, "Not Found", "")
            .into_result("issue DEMO-9")
            .unwrap_err();
        match err {
            ApiError::NotFound(msg) => assert_eq!(msg, "issue DEMO-9"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_reply() {
        let reply = Reply::not_found("unsupported verb 'PATCH'");
        assert_eq!(reply.status(), 404);
        assert_eq!(reply.value()["body"], "unsupported verb 'PATCH'");
    }
}
