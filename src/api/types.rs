//! Request and response schemas for the Jira and Xray endpoints.
//!
//! Payloads are typed per endpoint; fields the client never reads are left
//! out and tolerated by serde.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /rest/api/3/search/jql`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub jql: String,
    pub fields: Vec<String>,
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// One page of `POST /rest/api/3/search/jql`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub issues: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub is_last: Option<bool>,
}

impl SearchPage {
    /// Check if another page should be requested.
    pub fn has_more(&self) -> bool {
        !self.issues.is_empty() && self.is_last != Some(true) && self.next_page_token.is_some()
    }
}

/// The identifying part of an issue as returned by create/get calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueHandle {
    pub id: String,
    pub key: String,
}

impl IssueHandle {
    /// Read `id` and `key` out of a response value.
    ///
    /// Returns `None` unless both are present and non-empty.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = match value.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let key = value.get("key")?.as_str()?.to_string();
        if id.is_empty() || id == super::SENTINEL_ID || key.is_empty() {
            return None;
        }
        Some(Self { id, key })
    }
}

/// Body of `POST /rest/api/3/issueLink`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueLinkRequest {
    #[serde(rename = "type")]
    pub link_type: NamedRef,
    pub inward_issue: KeyRef,
    pub outward_issue: KeyRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyRef {
    pub key: String,
}

/// One step as stored by Xray.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub id: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub fields: StepFields,
}

/// The three standard columns of a manual test step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepFields {
    #[serde(rename = "Action", default)]
    pub action: String,
    #[serde(rename = "Data", default)]
    pub data: String,
    #[serde(rename = "Expected Result", default)]
    pub expected_result: String,
}

/// Body of the Xray create-step call.
///
/// The index is carried explicitly because steps are created concurrently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRequest {
    pub index: u32,
    pub fields: StepFields,
}

/// Response of the Xray get-steps call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepsPage {
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// A node of the Xray test repository folder tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

impl Folder {
    /// Walk `path` (segments separated by `/`) from this folder.
    ///
    /// An empty path or `/` resolves to this folder. Segment names are
    /// compared case-insensitively after trimming.
    pub fn find_path(&self, path: &str) -> Option<&Folder> {
        let mut current = self;
        for segment in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            current = current
                .folders
                .iter()
                .find(|f| f.name.trim().eq_ignore_ascii_case(segment))?;
        }
        Some(current)
    }
}

/// Body of the Xray create-folder call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub project_id: String,
    pub parent_folder_id: String,
    pub name: String,
}

/// Body of the Xray move-tests call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveTestsRequest {
    pub project_id: String,
    pub folder_id: String,
    pub test_issue_ids: Vec<String>,
}

/// Body of the Xray calls that attach tests to plans and executions.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestIdsRequest {
    pub test_issue_ids: Vec<String>,
}

/// Body of the Xray add-preconditions call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionIdsRequest {
    pub precondition_issue_ids: Vec<String>,
}

/// Atlassian Document Format (ADF) content.
///
/// Jira API v3 uses ADF for rich text fields like descriptions and comments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtlassianDoc {
    /// The document type (always "doc" for root documents).
    #[serde(rename = "type")]
    pub doc_type: String,
    /// The document version (typically 1).
    #[serde(default)]
    pub version: Option<u32>,
    /// The content nodes within the document.
    #[serde(default)]
    pub content: Vec<Value>,
}

impl AtlassianDoc {
    /// Build a document with one paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        let content = text
            .lines()
            .map(|line| {
                if line.is_empty() {
                    serde_json::json!({ "type": "paragraph", "content": [] })
                } else {
                    serde_json::json!({
                        "type": "paragraph",
                        "content": [{ "type": "text", "text": line }]
                    })
                }
            })
            .collect();

        Self {
            content,
            ..Self::default()
        }
    }

    /// Convert ADF content to plain text.
    pub fn to_plain_text(&self) -> String {
        let mut result = String::new();
        for node in &self.content {
            Self::extract_text(node, &mut result);
        }
        result.trim().to_string()
    }

    fn extract_text(node: &Value, result: &mut String) {
        match node {
            Value::Object(obj) => {
                match obj.get("type").and_then(|t| t.as_str()) {
                    Some("text") => {
                        if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                            result.push_str(text);
                        }
                    }
                    Some("hardBreak") => result.push('\n'),
                    _ => {
                        if let Some(Value::Array(items)) = obj.get("content") {
                            for item in items {
                                Self::extract_text(item, result);
                            }
                        }
                    }
                }
                if matches!(
                    obj.get("type").and_then(|t| t.as_str()),
                    Some("paragraph") | Some("heading")
                ) && !result.ends_with('\n')
                {
                    result.push('\n');
                }
            }
            Value::Array(items) => {
                for item in items {
                    Self::extract_text(item, result);
                }
            }
            _ => {}
        }
    }
}

impl Default for AtlassianDoc {
    fn default() -> Self {
        Self {
            doc_type: "doc".to_string(),
            version: Some(1),
            content: vec![],
        }
    }
}
