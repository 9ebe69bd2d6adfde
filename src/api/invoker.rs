//! Command invoker.
//!
//! Turns a [`Command`] into one HTTP exchange and normalizes the outcome into
//! a [`Reply`]. Commands carrying a session scope are sent to the Xray API
//! with the resolved session token in place of the issue key; all others go
//! to Jira with Basic Auth.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::auth::AuthContext;
use super::command::{Body, Command, Verb, SESSION_HEADER};
use super::error::{ApiError, Result};
use super::reply::Reply;
use super::session::SessionResolver;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Builds the request for one verb.
type SendStrategy = fn(&Client, &str) -> RequestBuilder;

fn send_get(client: &Client, url: &str) -> RequestBuilder {
    client.get(url)
}

fn send_post(client: &Client, url: &str) -> RequestBuilder {
    client.post(url)
}

fn send_put(client: &Client, url: &str) -> RequestBuilder {
    client.put(url)
}

fn send_delete(client: &Client, url: &str) -> RequestBuilder {
    client.delete(url)
}

/// Map a verb to its send strategy.
fn strategy(verb: Verb) -> SendStrategy {
    match verb {
        Verb::Get => send_get,
        Verb::Post => send_post,
        Verb::Put => send_put,
        Verb::Delete => send_delete,
    }
}

/// Sends commands to Jira and Xray.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    client: Client,
    context: AuthContext,
    xray_base_url: String,
    sessions: SessionResolver,
}

impl CommandInvoker {
    /// Create an invoker with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(context: AuthContext, xray_base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Network)?;
        Ok(Self::with_client(client, context, xray_base_url))
    }

    pub fn with_client(client: Client, context: AuthContext, xray_base_url: &str) -> Self {
        let sessions = SessionResolver::new(client.clone(), context.clone());
        Self {
            client,
            context,
            xray_base_url: xray_base_url.trim_end_matches('/').to_string(),
            sessions,
        }
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    pub fn sessions(&self) -> &SessionResolver {
        &self.sessions
    }

    /// Send one command.
    ///
    /// HTTP failures come back as an envelope inside `Ok`; `Err` is reserved
    /// for transport failures and for session-scoped commands whose token
    /// could not be resolved.
    #[instrument(skip(self, command), fields(verb = %command.verb(), route = %command.route()))]
    pub async fn invoke(&self, command: Command) -> Result<Reply> {
        match command.session_scope().map(str::to_string) {
            Some(issue_key) => {
                let token = self.sessions.resolve(&issue_key).await;
                if token.is_empty() {
                    warn!(issue_key = %issue_key, "No session token, refusing Xray call");
                    return Err(ApiError::SessionUnavailable(issue_key));
                }
                let command = command.with_header(SESSION_HEADER, token);
                let reply = send(&self.client, &self.xray_base_url, None, command).await?;
                if matches!(reply.status(), 401 | 403) {
                    debug!(issue_key = %issue_key, "Session token rejected, dropping it");
                    self.sessions.invalidate(&issue_key);
                }
                Ok(reply)
            }
            None => {
                send(
                    &self.client,
                    &self.context.base_url,
                    Some(self.context.auth.header_value()),
                    command,
                )
                .await
            }
        }
    }

    /// Send a request described by loose parts, as supplied by an external
    /// dispatcher.
    ///
    /// An unknown verb yields a synthesized 404 reply instead of an error.
    pub async fn invoke_parts(&self, verb: &str, route: &str, body: Option<Value>) -> Result<Reply> {
        let verb = match verb.parse::<Verb>() {
            Ok(verb) => verb,
            Err(message) => {
                debug!("{}", message);
                return Ok(Reply::not_found(&message));
            }
        };

        let mut command = Command::new(verb, route)?;
        if let Some(body) = body {
            command = command.with_json(&body)?;
        }
        self.invoke(command).await
    }
}

/// Send `command` to `base_url` and normalize the response.
pub(crate) async fn send(
    client: &Client,
    base_url: &str,
    authorization: Option<&str>,
    command: Command,
) -> Result<Reply> {
    let (route, verb, body, headers) = command.into_parts();
    let url = format!("{}{}", base_url, route);
    debug!(url = %url, "Sending {}", verb);

    let mut request = strategy(verb)(client, &url).header(header::ACCEPT, "application/json");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }

    request = match body {
        Some(Body::Json(value)) => request.json(&value),
        Some(Body::Raw(text)) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(text),
        Some(Body::Multipart {
            file_name,
            bytes,
            mime,
        }) => {
            let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime)?;
            request.multipart(Form::new().part("file", part))
        }
        None => request,
    };

    let response = request.send().await?;
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("");
    let text = response.text().await?;

    if !status.is_success() {
        debug!(status = status.as_u16(), "Error response body: {}", text);
    }

    Ok(Reply::from_http(status.as_u16(), reason, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Auth;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker_for(jira: &MockServer, xray: &MockServer) -> CommandInvoker {
        let context = AuthContext::new(&jira.uri(), Auth::new("qa@company.com", "t"), None);
        CommandInvoker::with_client(Client::new(), context, &xray.uri())
    }

    async fn mount_session(jira: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/rest/gira/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"issue": {"panels": [{"options": json!({"contextJwt": token}).to_string()}]}}
            })))
            .mount(jira)
            .await;
    }

    #[test]
    fn test_strategy_covers_every_verb() {
        let client = Client::new();
        for verb in [Verb::Get, Verb::Post, Verb::Put, Verb::Delete] {
            let request = strategy(verb)(&client, "http://localhost/x").build().unwrap();
            assert_eq!(request.method().as_str(), verb.as_str());
        }
    }

    #[tokio::test]
    async fn test_unscoped_command_targets_primary_with_basic_auth() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/3/issue/DEMO-1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1", "key": "DEMO-1"})))
            .expect(1)
            .mount(&jira)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let reply = invoker
            .invoke(Command::get("/rest/api/3/issue/DEMO-1").unwrap())
            .await
            .unwrap();

        assert_eq!(reply.value()["key"], "DEMO-1");
        assert!(xray.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scoped_command_targets_secondary_with_token() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        mount_session(&jira, "session-token").await;

        Mock::given(method("GET"))
            .and(path("/api/internal/test/100/steps"))
            .and(header(SESSION_HEADER, "session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"steps": []})))
            .expect(1)
            .mount(&xray)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let command = Command::get("/api/internal/test/100/steps")
            .unwrap()
            .with_session_scope("DEMO-1");
        let reply = invoker.invoke(command).await.unwrap();

        assert!(reply.is_success());
        let sent = &xray.received_requests().await.unwrap()[0];
        assert!(sent.headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_missing_token_refuses_secondary_call() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/gira/1/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&jira)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let command = Command::get("/api/internal/test/100/steps")
            .unwrap()
            .with_session_scope("DEMO-1");
        let err = invoker.invoke(command).await.unwrap_err();

        assert!(matches!(err, ApiError::SessionUnavailable(ref key) if key == "DEMO-1"));
        assert!(xray.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_status_is_normalized() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .mount(&jira)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let reply = invoker
            .invoke(Command::post("/rest/api/3/issue").unwrap().with_raw("{}"))
            .await
            .unwrap();

        assert_eq!(reply.status(), 400);
        assert_eq!(reply.value()["statusCode"], 400);
        assert_eq!(reply.value()["reasonPhrase"], "Bad Request");
        assert_eq!(reply.value()["body"], "bad");
        assert_eq!(reply.value()["id"], "-1");
    }

    #[tokio::test]
    async fn test_empty_success_body_is_normalized() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/3/issue/DEMO-1"))
            .and(body_json(json!({"fields": {"summary": "new"}})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&jira)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let command = Command::put("/rest/api/3/issue/DEMO-1")
            .unwrap()
            .with_json(&json!({"fields": {"summary": "new"}}))
            .unwrap();
        let reply = invoker.invoke(command).await.unwrap();

        assert!(reply.is_success());
        assert_eq!(reply.value()["statusCode"], 204);
    }

    #[tokio::test]
    async fn test_unknown_verb_yields_not_found_reply() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;

        let invoker = invoker_for(&jira, &xray);
        let reply = invoker
            .invoke_parts("PATCH", "/rest/api/3/issue/DEMO-1", None)
            .await
            .unwrap();

        assert_eq!(reply.status(), 404);
        assert_eq!(reply.value()["id"], "-1");
        assert!(jira.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multipart_upload_sends_csrf_header() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue/DEMO-1/attachments"))
            .and(header("X-Atlassian-Token", "no-check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "9"}])))
            .expect(1)
            .mount(&jira)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let command = crate::api::factory::jira::add_attachment(
            "DEMO-1",
            "run.log",
            b"ok".to_vec(),
            "text/plain",
        )
        .unwrap();
        let reply = invoker.invoke(command).await.unwrap();

        assert_eq!(reply.value()[0]["id"], "9");
    }

    #[tokio::test]
    async fn test_rejected_token_is_fetched_again() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/gira/1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"options": {"contextJwt": "stale-jwt"}})),
            )
            .up_to_n_times(1)
            .mount(&jira)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/gira/1/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"options": {"contextJwt": "fresh-jwt"}})),
            )
            .mount(&jira)
            .await;
        Mock::given(method("DELETE"))
            .and(header(SESSION_HEADER, "stale-jwt"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&xray)
            .await;
        Mock::given(method("DELETE"))
            .and(header(SESSION_HEADER, "fresh-jwt"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&xray)
            .await;

        let invoker = invoker_for(&jira, &xray);
        let command = Command::delete("/api/internal/test/100/step/s1")
            .unwrap()
            .with_session_scope("DEMO-1");

        let first = invoker.invoke(command.clone()).await.unwrap();
        assert_eq!(first.status(), 401);
        let second = invoker.invoke(command).await.unwrap();
        assert_eq!(second.status(), 204);

        let gira_fetches = jira
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/rest/gira/1/")
            .count();
        assert_eq!(gira_fetches, 2);
    }
}
