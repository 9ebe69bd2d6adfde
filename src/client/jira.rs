//! Jira facade.
//!
//! Task-shaped operations over the Jira REST API: issue reads and writes,
//! JQL search (paged and bucketed), project creation metadata and field
//! resolution, transitions, comments, attachments and links.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument};

use super::invoke_with_retry;
use crate::api::batch::{fan_out, key_in_jql, partition, FIND_BY_KEY_BUCKET};
use crate::api::factory::jira;
use crate::api::types::SearchPage;
use crate::api::{ApiError, CommandInvoker, Reply, Result, RetryPolicy};
use crate::cache::MetadataCache;
use crate::config::Settings;

/// Fields requested by default from search.
pub const DEFAULT_SEARCH_FIELDS: &[&str] = &["summary", "issuetype", "status", "project"];

/// Page size used when walking search results.
const SEARCH_PAGE_SIZE: u32 = 100;

/// The Jira facade.
#[derive(Debug, Clone)]
pub struct JiraClient {
    invoker: Arc<CommandInvoker>,
    metadata: MetadataCache,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl JiraClient {
    pub fn new(invoker: Arc<CommandInvoker>, settings: &Settings, metadata: MetadataCache) -> Self {
        Self {
            invoker,
            metadata,
            retry: settings.retry_policy(),
            max_parallel: settings.parallelism(),
        }
    }

    pub fn invoker(&self) -> &CommandInvoker {
        &self.invoker
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// The browse URL of an issue.
    pub fn browse_link(&self, key: &str) -> String {
        format!("{}/browse/{}", self.invoker.context().base_url, key)
    }

    /// Get a single issue by key or id.
    #[instrument(skip(self), fields(issue_key = %key))]
    pub async fn get_issue(&self, key: &str) -> Result<Value> {
        let reply = self.invoker.invoke(jira::get_issue(key)?).await?;
        reply.into_result(&format!("Issue '{}' not found", key))
    }

    /// Every issue matching `jql`, walking all pages.
    #[instrument(skip(self, fields), fields(jql = %jql))]
    pub async fn find_by_jql(&self, jql: &str, fields: &[&str]) -> Result<Vec<Value>> {
        let mut issues = Vec::new();
        let mut next_page_token = None;

        loop {
            let command = jira::search(jql, fields, SEARCH_PAGE_SIZE, next_page_token.take())?;
            let value = self.invoker.invoke(command).await?.into_result("search")?;
            let page: SearchPage = serde_json::from_value(value)
                .map_err(|e| ApiError::InvalidResponse(format!("search page: {}", e)))?;

            let more = page.has_more();
            issues.extend(page.issues);
            if !more {
                break;
            }
            next_page_token = page.next_page_token;
        }

        debug!("Found {} issues", issues.len());
        Ok(issues)
    }

    /// Look up issues by key, in buckets queried concurrently.
    ///
    /// Results are unordered; keys that do not exist are simply absent.
    #[instrument(skip(self, keys, fields), fields(count = keys.len()))]
    pub async fn find_by_keys(&self, keys: &[String], fields: &[&str]) -> Result<Vec<Value>> {
        let buckets = partition(keys, FIND_BY_KEY_BUCKET);
        let pages = fan_out(buckets, self.max_parallel, |bucket| async move {
            self.find_by_jql(&key_in_jql(&bucket), fields).await
        })
        .await;

        let mut issues = Vec::with_capacity(keys.len());
        for page in pages {
            issues.extend(page?);
        }
        Ok(issues)
    }

    /// Create an issue. The reply is returned as-is for the caller to check.
    #[instrument(skip(self, fields))]
    pub async fn create_issue(&self, fields: &Value) -> Result<Reply> {
        let reply =
            invoke_with_retry(&self.invoker, &self.retry, "create issue", jira::create_issue(fields)?)
                .await?;
        if reply.is_success() {
            info!(key = %reply.value()["key"], "Issue created");
        }
        Ok(reply)
    }

    #[instrument(skip(self, fields), fields(issue_key = %key))]
    pub async fn update_issue(&self, key: &str, fields: &Value) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "update issue",
            jira::update_issue(key, fields)?,
        )
        .await
    }

    #[instrument(skip(self), fields(issue_key = %key))]
    pub async fn delete_issue(&self, key: &str) -> Result<Reply> {
        invoke_with_retry(&self.invoker, &self.retry, "delete issue", jira::delete_issue(key)?)
            .await
    }

    pub async fn get_project(&self, key: &str) -> Result<Value> {
        let reply = self.invoker.invoke(jira::get_project(key)?).await?;
        reply.into_result(&format!("Project '{}' not found", key))
    }

    /// The numeric id of a project.
    pub async fn project_id(&self, key: &str) -> Result<String> {
        let project = self.get_project(key).await?;
        match project.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(ApiError::InvalidResponse(format!(
                "project '{}' has no id",
                key
            ))),
        }
    }

    /// Creation metadata of a project, fetched once and then cached.
    pub async fn create_meta(&self, project: &str) -> Result<Arc<Value>> {
        self.metadata
            .get_or_fetch(project, || async {
                let reply = self.invoker.invoke(jira::create_meta(project)?).await?;
                reply.into_result(&format!("metadata for project '{}'", project))
            })
            .await
    }

    /// The field map of one issue type, keyed by field id.
    async fn issue_type_fields(&self, project: &str, issue_type: &str) -> Result<Option<Value>> {
        let meta = self.create_meta(project).await?;
        Ok(meta
            .get("projects")
            .and_then(Value::as_array)
            .and_then(|projects| {
                projects.iter().find(|p| {
                    p.get("key")
                        .and_then(Value::as_str)
                        .is_some_and(|k| k.eq_ignore_ascii_case(project))
                })
            })
            .and_then(|p| p.get("issuetypes"))
            .and_then(Value::as_array)
            .and_then(|types| {
                types.iter().find(|t| {
                    t.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.eq_ignore_ascii_case(issue_type))
                })
            })
            .and_then(|t| t.get("fields"))
            .cloned())
    }

    /// Resolve a field's id from its display name (or id).
    ///
    /// Returns `None` when the project, issue type or field is unknown.
    pub async fn resolve_field_id(
        &self,
        project: &str,
        issue_type: &str,
        field_name: &str,
    ) -> Result<Option<String>> {
        let Some(Value::Object(fields)) = self.issue_type_fields(project, issue_type).await? else {
            return Ok(None);
        };

        if fields.contains_key(field_name) {
            return Ok(Some(field_name.to_string()));
        }

        Ok(fields
            .iter()
            .find(|(_, field)| {
                field
                    .get("name")
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.eq_ignore_ascii_case(field_name))
            })
            .map(|(id, _)| id.clone()))
    }

    /// Resolve a value against a field's allowed values.
    ///
    /// Returns the `{"id": ..}` reference Jira expects, or `None` when the
    /// value is not allowed. Fields without allowed values return `None`.
    pub async fn resolve_allowed_value(
        &self,
        project: &str,
        issue_type: &str,
        field_id: &str,
        value: &str,
    ) -> Result<Option<Value>> {
        let fields = self.issue_type_fields(project, issue_type).await?;
        let allowed = fields
            .as_ref()
            .and_then(|f| f.get(field_id))
            .and_then(|f| f.get("allowedValues"))
            .and_then(Value::as_array);

        Ok(allowed.and_then(|values| {
            values
                .iter()
                .find(|v| {
                    ["value", "name"].iter().any(|attr| {
                        v.get(*attr)
                            .and_then(Value::as_str)
                            .is_some_and(|s| s.eq_ignore_ascii_case(value))
                    })
                })
                .and_then(|v| v.get("id"))
                .map(|id| serde_json::json!({ "id": id }))
        }))
    }

    pub async fn get_transitions(&self, key: &str) -> Result<Vec<Value>> {
        let value = self
            .invoker
            .invoke(jira::get_transitions(key)?)
            .await?
            .into_result(&format!("transitions of '{}'", key))?;
        Ok(value
            .get("transitions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Move an issue through the transition with the given name or id.
    #[instrument(skip(self), fields(issue_key = %key))]
    pub async fn transition_issue(&self, key: &str, transition: &str) -> Result<Reply> {
        let transitions = self.get_transitions(key).await?;
        let id = transitions
            .iter()
            .find(|t| {
                t.get("id").and_then(Value::as_str) == Some(transition)
                    || t.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.eq_ignore_ascii_case(transition))
            })
            .and_then(|t| t.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::NotFound(format!("transition '{}' for issue '{}'", transition, key))
            })?;

        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "transition issue",
            jira::transition_issue(key, id)?,
        )
        .await
    }

    pub async fn add_comment(&self, key: &str, text: &str) -> Result<Reply> {
        invoke_with_retry(&self.invoker, &self.retry, "add comment", jira::add_comment(key, text)?)
            .await
    }

    #[instrument(skip(self, path), fields(issue_key = %key))]
    pub async fn add_attachment(&self, key: &str, path: &Path) -> Result<Reply> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("cannot read {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment");

        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "add attachment",
            jira::add_attachment(key, file_name, bytes, "application/octet-stream")?,
        )
        .await
    }

    pub async fn link_issues(&self, link_type: &str, inward: &str, outward: &str) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "link issues",
            jira::link_issues(link_type, inward, outward)?,
        )
        .await
    }
}
