//! Composite test-management operations.
//!
//! Each operation chains several facade calls where later calls depend on
//! ids returned by earlier ones (issue created, then steps attached). When a
//! later call fails after an earlier one succeeded, the operation reports a
//! [`OperationResult::Partial`] carrying what was created instead of
//! discarding it.

mod folder;
mod plan;
mod test_case;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::api::batch::fan_out;
use crate::api::types::{IssueHandle, StepFields};
use crate::api::ApiError;
use crate::client::{Clients, DEFAULT_SEARCH_FIELDS};
use crate::error::AppError;

pub use folder::FolderAssignment;

/// Jira issue type of Xray tests.
pub const TEST_ISSUE_TYPE: &str = "Test";

/// Jira issue type of Xray test plans.
pub const TEST_PLAN_ISSUE_TYPE: &str = "Test Plan";

/// Name of the Xray custom field holding the test type.
pub const TEST_TYPE_FIELD: &str = "Test Type";

/// Failures of the composite operations themselves.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Jira answered a create call without an id or key.
    #[error("create issue response is missing id or key")]
    MissingIdentity { response: Value },

    #[error("folder '{0}' not found")]
    FolderNotFound(String),

    #[error("test '{0}' not found")]
    TestNotFound(String),

    #[error("no tests matched '{0}'")]
    NoTestsMatched(String),

    /// The supplied definition is unusable.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for composite operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// The identity of an issue as reported to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRef {
    pub id: String,
    pub key: String,
    pub link: String,
}

/// Outcome of a composite operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OperationResult {
    /// Every step succeeded.
    Success(IssueRef),
    /// The issue exists but a dependent step failed.
    Partial {
        data: IssueRef,
        error: String,
        message: String,
    },
}

impl OperationResult {
    pub fn issue(&self) -> &IssueRef {
        match self {
            OperationResult::Success(issue) => issue,
            OperationResult::Partial { data, .. } => data,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, OperationResult::Partial { .. })
    }

    fn partial(data: IssueRef, error: String, message: &str) -> Self {
        OperationResult::Partial {
            data,
            error,
            message: message.to_string(),
        }
    }
}

/// One manual test step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestStep {
    pub action: String,
    #[serde(default)]
    pub data: String,
    #[serde(default, alias = "result")]
    pub expected: String,
}

impl TestStep {
    pub fn new(action: &str, expected: &str) -> Self {
        Self {
            action: action.to_string(),
            data: String::new(),
            expected: expected.to_string(),
        }
    }

    fn fields(&self) -> StepFields {
        StepFields {
            action: self.action.clone(),
            data: self.data.clone(),
            expected_result: self.expected.clone(),
        }
    }
}

fn default_test_type() -> String {
    "Manual".to_string()
}

/// A test case definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub project: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_test_type")]
    pub test_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Extra fields by display name or id.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Keys of precondition issues to attach.
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
}

impl TestCase {
    pub fn new(project: &str, summary: &str) -> Self {
        Self {
            project: project.to_string(),
            summary: summary.to_string(),
            description: String::new(),
            test_type: default_test_type(),
            labels: Vec::new(),
            fields: BTreeMap::new(),
            preconditions: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, action: &str, expected: &str) -> Self {
        self.steps.push(TestStep::new(action, expected));
        self
    }

    fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(DomainError::InvalidDefinition("project is required".to_string()));
        }
        if self.summary.trim().is_empty() {
            return Err(DomainError::InvalidDefinition("summary is required".to_string()));
        }
        if let Some(i) = self.steps.iter().position(|s| s.action.trim().is_empty()) {
            return Err(DomainError::InvalidDefinition(format!(
                "step {} has no action",
                i
            )));
        }
        Ok(())
    }
}

/// Which tests an operation applies to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TestSelection {
    Keys(Vec<String>),
    Jql(String),
}

impl TestSelection {
    fn describe(&self) -> String {
        match self {
            TestSelection::Keys(keys) => keys.join(","),
            TestSelection::Jql(jql) => jql.clone(),
        }
    }
}

/// A test plan definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    pub project: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub tests: TestSelection,
}

/// Runs composite operations over a set of clients.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    clients: Clients,
}

impl Orchestrator {
    pub fn new(clients: Clients) -> Self {
        Self { clients }
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    fn issue_ref(&self, handle: &IssueHandle) -> IssueRef {
        IssueRef {
            id: handle.id.clone(),
            key: handle.key.clone(),
            link: self.clients.jira.browse_link(&handle.key),
        }
    }

    /// Resolve a selection to issue handles.
    async fn select_tests(&self, selection: &TestSelection) -> Result<Vec<IssueHandle>> {
        let issues = match selection {
            TestSelection::Keys(keys) => {
                self.clients
                    .jira
                    .find_by_keys(keys, DEFAULT_SEARCH_FIELDS)
                    .await?
            }
            TestSelection::Jql(jql) => {
                self.clients
                    .jira
                    .find_by_jql(jql, DEFAULT_SEARCH_FIELDS)
                    .await?
            }
        };
        Ok(issues.iter().filter_map(IssueHandle::from_value).collect())
    }

    /// Create every step of `steps` on the test, concurrently.
    ///
    /// Each call carries its position as an explicit index. Returns the
    /// failure descriptions, empty when every step was created.
    async fn create_steps(&self, test: &IssueHandle, steps: &[TestStep]) -> Vec<String> {
        let xray = &self.clients.xray;
        let outcomes = fan_out(steps.iter().enumerate(), xray.max_parallel(), |(index, step)| {
            let fields = step.fields();
            async move {
                let index = index as u32;
                let outcome = xray.add_step(&test.key, &test.id, index, &fields).await;
                (index, outcome)
            }
        })
        .await;

        let mut failures: Vec<(u32, String)> = outcomes
            .into_iter()
            .filter_map(|(index, outcome)| match outcome {
                Ok(reply) if reply.is_success() => None,
                Ok(reply) => Some((index, format!("step {}: HTTP {}", index, reply.status()))),
                Err(e) => Some((index, format!("step {}: {}", index, e))),
            })
            .collect();
        failures.sort();
        for (_, failure) in &failures {
            warn!(issue_key = %test.key, "{}", failure);
        }
        failures.into_iter().map(|(_, f)| f).collect()
    }
}

/// Turn an operation outcome into the JSON handed to a tool caller.
///
/// Failures become `{"error", "message"}` objects (with the raw response in
/// `data` when Jira returned an unexpected create response), so the caller
/// always receives a JSON shape.
pub fn into_tool_response<T: Serialize>(result: std::result::Result<T, AppError>) -> Value {
    match result {
        Ok(value) => serde_json::to_value(value).unwrap_or_else(|e| {
            json!({ "error": e.to_string(), "message": "result could not be serialized" })
        }),
        Err(e) => {
            let mut response = json!({ "error": e.to_string(), "message": e.user_message() });
            if let AppError::Domain(DomainError::MissingIdentity { response: raw }) = &e {
                response["data"] = raw.clone();
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> IssueRef {
        IssueRef {
            id: "10001".to_string(),
            key: "DEMO-1".to_string(),
            link: "https://company.atlassian.net/browse/DEMO-1".to_string(),
        }
    }

    #[test]
    fn test_success_serializes_flat() {
        let value = serde_json::to_value(OperationResult::Success(issue())).unwrap();
        assert_eq!(value, json!({
            "id": "10001",
            "key": "DEMO-1",
            "link": "https://company.atlassian.net/browse/DEMO-1"
        }));
    }

    #[test]
    fn test_partial_serializes_with_data() {
        let result = OperationResult::partial(issue(), "step 0: HTTP 500".to_string(), "created, but step creation failed");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["data"]["key"], "DEMO-1");
        assert_eq!(value["error"], "step 0: HTTP 500");
        assert_eq!(value["message"], "created, but step creation failed");
        assert!(result.is_partial());
    }

    #[test]
    fn test_test_case_definition_defaults() {
        let case: TestCase = serde_json::from_value(json!({
            "project": "DEMO",
            "summary": "Login works",
            "steps": [{"action": "click login", "result": "page loads"}]
        }))
        .unwrap();
        assert_eq!(case.test_type, "Manual");
        assert_eq!(case.steps[0].expected, "page loads");
        assert!(case.validate().is_ok());
    }

    #[test]
    fn test_test_case_validation() {
        assert!(TestCase::new("DEMO", " ").validate().is_err());
        assert!(TestCase::new("", "Login").validate().is_err());
        let err = TestCase::new("DEMO", "Login")
            .with_step("", "nothing")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("step 0"));
    }

    #[test]
    fn test_selection_deserializes() {
        let keys: TestSelection = serde_json::from_value(json!({"keys": ["DEMO-1"]})).unwrap();
        assert_eq!(keys, TestSelection::Keys(vec!["DEMO-1".to_string()]));
        let jql: TestSelection = serde_json::from_value(json!({"jql": "project = DEMO"})).unwrap();
        assert_eq!(jql.describe(), "project = DEMO");
    }

    #[test]
    fn test_tool_response_for_missing_identity() {
        let err = AppError::Domain(DomainError::MissingIdentity {
            response: json!({"statusCode": 400, "id": "-1"}),
        });
        let value = into_tool_response::<OperationResult>(Err(err));
        assert_eq!(value["data"]["statusCode"], 400);
        assert!(value["error"].as_str().unwrap().contains("missing id or key"));
        assert!(value["message"].is_string());
    }

    #[test]
    fn test_tool_response_for_folder_not_found() {
        let err = AppError::Domain(DomainError::FolderNotFound("/Nope".to_string()));
        let value = into_tool_response::<OperationResult>(Err(err));
        assert_eq!(value["error"], "folder '/Nope' not found");
        assert!(value.get("data").is_none());
    }
}
