//! Commands for the Jira REST API v3.

use serde_json::{json, Value};

use crate::api::command::Command;
use crate::api::error::Result;
use crate::api::types::{AtlassianDoc, IssueLinkRequest, KeyRef, NamedRef, SearchRequest};

/// Route prefix of the versioned Jira REST API.
pub const API_PREFIX: &str = "/rest/api/3";

/// Internal GraphQL route that hands out Xray session tokens.
pub const GIRA_ROUTE: &str = "/rest/gira/1/";

/// Largest page Jira's search endpoint returns.
pub const MAX_SEARCH_PAGE: u32 = 100;

/// Query posted to [`GIRA_ROUTE`]. `{issueKey}` and `{projectKey}` are
/// substituted before sending.
const SESSION_QUERY_TEMPLATE: &str = concat!(
    "query XrayIssueContext { ",
    "issue(issueIdOrKey: \"{issueKey}\", latestVersion: true, screen: \"view\") { ",
    "id ",
    "ecosystem(projectKey: \"{projectKey}\") { contentPanels { appKey moduleKey options } } ",
    "} }"
);

pub fn get_issue(key: &str) -> Result<Command> {
    Command::get(format!("{}/issue/{}", API_PREFIX, urlencoding::encode(key)))
}

/// One page of a JQL search.
pub fn search(
    jql: &str,
    fields: &[&str],
    max_results: u32,
    next_page_token: Option<String>,
) -> Result<Command> {
    let request = SearchRequest {
        jql: jql.to_string(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
        max_results: max_results.clamp(1, MAX_SEARCH_PAGE),
        next_page_token,
    };
    Command::post(format!("{}/search/jql", API_PREFIX))?.with_json(&request)
}

/// Create an issue from a `fields` object.
pub fn create_issue(fields: &Value) -> Result<Command> {
    Command::post(format!("{}/issue", API_PREFIX))?.with_json(&json!({ "fields": fields }))
}

pub fn update_issue(key: &str, fields: &Value) -> Result<Command> {
    Command::put(format!("{}/issue/{}", API_PREFIX, urlencoding::encode(key)))?
        .with_json(&json!({ "fields": fields }))
}

pub fn delete_issue(key: &str) -> Result<Command> {
    Command::delete(format!(
        "{}/issue/{}?deleteSubtasks=true",
        API_PREFIX,
        urlencoding::encode(key)
    ))
}

pub fn get_project(key: &str) -> Result<Command> {
    Command::get(format!("{}/project/{}", API_PREFIX, urlencoding::encode(key)))
}

/// Creation metadata (issue types and their fields) for one project.
pub fn create_meta(project_key: &str) -> Result<Command> {
    Command::get(format!(
        "{}/issue/createmeta?projectKeys={}&expand=projects.issuetypes.fields",
        API_PREFIX,
        urlencoding::encode(project_key)
    ))
}

pub fn get_transitions(key: &str) -> Result<Command> {
    Command::get(format!(
        "{}/issue/{}/transitions",
        API_PREFIX,
        urlencoding::encode(key)
    ))
}

pub fn transition_issue(key: &str, transition_id: &str) -> Result<Command> {
    Command::post(format!(
        "{}/issue/{}/transitions",
        API_PREFIX,
        urlencoding::encode(key)
    ))?
    .with_json(&json!({ "transition": { "id": transition_id } }))
}

pub fn add_comment(key: &str, text: &str) -> Result<Command> {
    Command::post(format!("{}/issue/{}/comment", API_PREFIX, urlencoding::encode(key)))?
        .with_json(&json!({ "body": AtlassianDoc::from_plain_text(text) }))
}

/// Upload one attachment. Jira requires the anti-CSRF header on uploads.
pub fn add_attachment(key: &str, file_name: &str, bytes: Vec<u8>, mime: &str) -> Result<Command> {
    Ok(Command::post(format!(
        "{}/issue/{}/attachments",
        API_PREFIX,
        urlencoding::encode(key)
    ))?
    .with_header("X-Atlassian-Token", "no-check")
    .with_file(file_name, bytes, mime))
}

pub fn link_issues(link_type: &str, inward_key: &str, outward_key: &str) -> Result<Command> {
    let request = IssueLinkRequest {
        link_type: NamedRef {
            name: link_type.to_string(),
        },
        inward_issue: KeyRef {
            key: inward_key.to_string(),
        },
        outward_issue: KeyRef {
            key: outward_key.to_string(),
        },
    };
    Command::post(format!("{}/issueLink", API_PREFIX))?.with_json(&request)
}

/// The query that returns the Xray session token scoped to `issue_key`.
pub fn session_query(project_key: &str, issue_key: &str) -> Result<Command> {
    let query = SESSION_QUERY_TEMPLATE
        .replace("{issueKey}", issue_key)
        .replace("{projectKey}", project_key);
    Command::post(GIRA_ROUTE)?.with_json(&json!({ "query": query, "variables": {} }))
}
