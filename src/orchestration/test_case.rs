//! Creating and updating tests with their steps.

use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use super::{
    DomainError, OperationResult, Orchestrator, Result, TestCase, TEST_ISSUE_TYPE, TEST_TYPE_FIELD,
};
use crate::api::batch::fan_out;
use crate::api::types::{AtlassianDoc, IssueHandle};
use crate::api::ApiError;

const STEP_CREATION_FAILED: &str = "created, but step creation failed";
const STEP_REPLACEMENT_FAILED: &str = "updated, but step replacement failed";
const PRECONDITIONS_FAILED: &str = "created, but preconditions could not be attached";

impl Orchestrator {
    /// Create a test issue and then its steps.
    ///
    /// Fails without a partial envelope when the issue itself could not be
    /// created. Once the issue exists, any step failure yields
    /// [`OperationResult::Partial`].
    #[instrument(skip(self, case), fields(project = %case.project, steps = case.steps.len()))]
    pub async fn create_test(&self, case: &TestCase) -> Result<OperationResult> {
        case.validate()?;

        let fields = self.test_fields(case, true).await?;
        let reply = self.clients.jira.create_issue(&fields).await?;
        let test = IssueHandle::from_value(reply.value()).ok_or_else(|| {
            DomainError::MissingIdentity {
                response: reply.clone().into_value(),
            }
        })?;
        info!(key = %test.key, "Test created");

        let issue = self.issue_ref(&test);

        let failures = self.create_steps(&test, &case.steps).await;
        if !failures.is_empty() {
            return Ok(OperationResult::partial(
                issue,
                failures.join("; "),
                STEP_CREATION_FAILED,
            ));
        }

        if let Err(error) = self.attach_preconditions(&test, &case.preconditions).await {
            return Ok(OperationResult::partial(issue, error, PRECONDITIONS_FAILED));
        }

        Ok(OperationResult::Success(issue))
    }

    /// Replace a test's fields and steps.
    ///
    /// The current steps are read before any change is sent, so a failed
    /// read leaves the test untouched. Existing steps are all deleted before
    /// the new ones are created. This is not transactional: if recreation
    /// fails the test is left with fewer steps than defined, which is
    /// reported as a partial result.
    #[instrument(skip(self, case), fields(issue_key = %key, steps = case.steps.len()))]
    pub async fn update_test(&self, key: &str, case: &TestCase) -> Result<OperationResult> {
        case.validate()?;

        let existing = match self.clients.jira.get_issue(key).await {
            Ok(issue) => issue,
            Err(ApiError::NotFound(_)) => return Err(DomainError::TestNotFound(key.to_string())),
            Err(e) => return Err(e.into()),
        };
        let test = IssueHandle::from_value(&existing)
            .ok_or_else(|| DomainError::TestNotFound(key.to_string()))?;

        // read before writing anything
        let steps = self.clients.xray.get_steps(&test.key, &test.id).await?;
        let fields = self.test_fields(case, false).await?;
        self.clients
            .jira
            .update_issue(&test.key, &fields)
            .await?
            .into_result(&format!("update of '{}'", test.key))?;

        let issue = self.issue_ref(&test);
        info!(existing = steps.len(), "Replacing test steps");

        let xray = &self.clients.xray;
        let test_ref = &test;
        let deletions = fan_out(steps, xray.max_parallel(), |step| async move {
            let outcome = xray.delete_step(&test_ref.key, &test_ref.id, &step.id).await;
            (step.id, outcome)
        })
        .await;

        let failures: Vec<String> = deletions
            .into_iter()
            .filter_map(|(step_id, outcome)| match outcome {
                Ok(reply) if reply.is_success() => None,
                Ok(reply) => Some(format!("delete step {}: HTTP {}", step_id, reply.status())),
                Err(e) => Some(format!("delete step {}: {}", step_id, e)),
            })
            .collect();
        if !failures.is_empty() {
            warn!(issue_key = %test.key, "Step deletion failed, not recreating steps");
            return Ok(OperationResult::partial(
                issue,
                failures.join("; "),
                STEP_REPLACEMENT_FAILED,
            ));
        }

        let failures = self.create_steps(&test, &case.steps).await;
        if !failures.is_empty() {
            return Ok(OperationResult::partial(
                issue,
                failures.join("; "),
                STEP_REPLACEMENT_FAILED,
            ));
        }

        Ok(OperationResult::Success(issue))
    }

    /// Build the Jira `fields` object of a test.
    ///
    /// Extra fields are resolved by name through the project's creation
    /// metadata; names that do not resolve are skipped.
    async fn test_fields(&self, case: &TestCase, creating: bool) -> Result<Value> {
        let jira = &self.clients.jira;
        let mut fields = Map::new();

        if creating {
            fields.insert("project".to_string(), json!({ "key": case.project }));
            fields.insert("issuetype".to_string(), json!({ "name": TEST_ISSUE_TYPE }));
        }
        fields.insert("summary".to_string(), json!(case.summary));
        fields.insert(
            "description".to_string(),
            json!(AtlassianDoc::from_plain_text(&case.description)),
        );
        fields.insert("labels".to_string(), json!(case.labels));

        let mut extra: Vec<(&str, Value)> = case
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        if creating && !case.fields.contains_key(TEST_TYPE_FIELD) {
            extra.push((TEST_TYPE_FIELD, json!(case.test_type)));
        }

        for (name, value) in extra {
            let Some(id) = jira
                .resolve_field_id(&case.project, TEST_ISSUE_TYPE, name)
                .await?
            else {
                warn!(field = name, "Field not found in project metadata, skipping");
                continue;
            };

            let resolved = match value.as_str() {
                Some(text) => jira
                    .resolve_allowed_value(&case.project, TEST_ISSUE_TYPE, &id, text)
                    .await?
                    .unwrap_or(value),
                None => value,
            };
            fields.insert(id, resolved);
        }

        Ok(Value::Object(fields))
    }

    async fn attach_preconditions(
        &self,
        test: &IssueHandle,
        keys: &[String],
    ) -> std::result::Result<(), String> {
        if keys.is_empty() {
            return Ok(());
        }

        let found = self
            .select_tests(&super::TestSelection::Keys(keys.to_vec()))
            .await
            .map_err(|e| e.to_string())?;
        if found.len() != keys.len() {
            return Err(format!(
                "{} of {} preconditions not found",
                keys.len() - found.len(),
                keys.len()
            ));
        }

        let ids: Vec<String> = found.into_iter().map(|h| h.id).collect();
        let reply = self
            .clients
            .xray
            .add_preconditions(&test.key, &test.id, &ids)
            .await
            .map_err(|e| e.to_string())?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(format!("add preconditions: HTTP {}", reply.status()))
        }
    }
}
