//! Test plans and test executions.

use serde_json::json;
use tracing::{info, instrument, warn};

use super::{
    DomainError, IssueRef, OperationResult, Orchestrator, Result, TestPlan, TestSelection,
    TEST_PLAN_ISSUE_TYPE,
};
use crate::api::types::{AtlassianDoc, IssueHandle};
use crate::api::ApiError;

const ASSIGNMENT_FAILED: &str = "created, but test assignment failed";
const EXECUTION_ASSIGNMENT_FAILED: &str = "some tests could not be added to the execution";

impl Orchestrator {
    /// Create a test plan and add the selected tests to it.
    #[instrument(skip(self, plan), fields(project = %plan.project))]
    pub async fn create_test_plan(&self, plan: &TestPlan) -> Result<OperationResult> {
        if plan.summary.trim().is_empty() {
            return Err(DomainError::InvalidDefinition("summary is required".to_string()));
        }

        let fields = json!({
            "project": { "key": plan.project },
            "issuetype": { "name": TEST_PLAN_ISSUE_TYPE },
            "summary": plan.summary,
            "description": AtlassianDoc::from_plain_text(&plan.description),
            "labels": plan.labels,
        });
        let reply = self.clients.jira.create_issue(&fields).await?;
        let created = IssueHandle::from_value(reply.value()).ok_or_else(|| {
            DomainError::MissingIdentity {
                response: reply.clone().into_value(),
            }
        })?;
        info!(key = %created.key, "Test plan created");

        let issue = self.issue_ref(&created);
        match self.assign_to_plan(&created, &plan.tests).await {
            Ok(count) => {
                info!(count, "Tests added to plan");
                Ok(OperationResult::Success(issue))
            }
            Err(error) => {
                warn!(issue_key = %created.key, "{}", error);
                Ok(OperationResult::partial(issue, error, ASSIGNMENT_FAILED))
            }
        }
    }

    async fn assign_to_plan(
        &self,
        plan: &IssueHandle,
        selection: &TestSelection,
    ) -> std::result::Result<usize, String> {
        let tests = self.select_tests(selection).await.map_err(|e| e.to_string())?;
        if tests.is_empty() {
            return Err(DomainError::NoTestsMatched(selection.describe()).to_string());
        }

        let ids: Vec<String> = tests.into_iter().map(|t| t.id).collect();
        let reply = self
            .clients
            .xray
            .add_tests_to_plan(&plan.key, &plan.id, &ids)
            .await
            .map_err(|e| e.to_string())?;
        if reply.is_success() {
            Ok(ids.len())
        } else {
            Err(format!("add tests to plan: HTTP {}", reply.status()))
        }
    }

    /// Add the selected tests to an existing test execution.
    ///
    /// Tests are sent in buckets; if any bucket fails the result is partial.
    #[instrument(skip(self, selection), fields(issue_key = %execution_key))]
    pub async fn add_tests_to_execution(
        &self,
        execution_key: &str,
        selection: &TestSelection,
    ) -> Result<OperationResult> {
        let execution = match self.clients.jira.get_issue(execution_key).await {
            Ok(issue) => issue,
            Err(ApiError::NotFound(_)) => {
                return Err(DomainError::TestNotFound(execution_key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let execution = IssueHandle::from_value(&execution)
            .ok_or_else(|| DomainError::TestNotFound(execution_key.to_string()))?;

        let tests = self.select_tests(selection).await?;
        if tests.is_empty() {
            return Err(DomainError::NoTestsMatched(selection.describe()));
        }

        let ids: Vec<String> = tests.into_iter().map(|t| t.id).collect();
        let replies = self
            .clients
            .xray
            .add_tests_to_execution(&execution.key, &execution.id, &ids)
            .await?;

        let issue: IssueRef = self.issue_ref(&execution);
        let failed: Vec<String> = replies
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| format!("HTTP {}", r.status()))
            .collect();
        if failed.is_empty() {
            info!(count = ids.len(), "Tests added to execution");
            Ok(OperationResult::Success(issue))
        } else {
            Ok(OperationResult::partial(
                issue,
                format!("{} of {} buckets failed: {}", failed.len(), replies.len(), failed.join(", ")),
                EXECUTION_ASSIGNMENT_FAILED,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Clients;
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_jira(jira: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/rest/gira/1/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"options": {"contextJwt": "jwt"}})),
            )
            .mount(jira)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/issue"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "20001", "key": "DEMO-50"})),
            )
            .mount(jira)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/search/jql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {"id": "10001", "key": "DEMO-1"},
                    {"id": "10002", "key": "DEMO-2"}
                ],
                "isLast": true
            })))
            .mount(jira)
            .await;
    }

    fn plan() -> TestPlan {
        TestPlan {
            project: "DEMO".to_string(),
            summary: "Release 1.0".to_string(),
            description: String::new(),
            labels: vec![],
            tests: TestSelection::Jql("project = DEMO AND issuetype = Test".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_plan_assigns_tests() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        mount_jira(&jira).await;
        Mock::given(method("POST"))
            .and(path("/api/internal/testplan/20001/tests"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"added": 2})))
            .expect(1)
            .mount(&xray)
            .await;

        let orchestrator = Orchestrator::new(Clients::for_tests(&jira, &xray));
        let result = orchestrator.create_test_plan(&plan()).await.unwrap();
        assert!(!result.is_partial());
        assert_eq!(result.issue().key, "DEMO-50");

        let requests = xray.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["testIssueIds"], json!(["10001", "10002"]));
    }

    #[tokio::test]
    async fn test_create_plan_assignment_failure_is_partial() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        mount_jira(&jira).await;
        Mock::given(method("POST"))
            .and(path("/api/internal/testplan/20001/tests"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&xray)
            .await;

        let orchestrator = Orchestrator::new(Clients::for_tests(&jira, &xray));
        let result = orchestrator.create_test_plan(&plan()).await.unwrap();

        match result {
            OperationResult::Partial { data, message, .. } => {
                assert_eq!(data.id, "20001");
                assert_eq!(message, ASSIGNMENT_FAILED);
            }
            other => panic!("Expected partial result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execution_requires_matching_tests() {
        let jira = MockServer::start().await;
        let xray = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/3/issue/DEMO-90"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "30001", "key": "DEMO-90"})),
            )
            .mount(&jira)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/search/jql"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"issues": [], "isLast": true})),
            )
            .mount(&jira)
            .await;

        let orchestrator = Orchestrator::new(Clients::for_tests(&jira, &xray));
        let err = orchestrator
            .add_tests_to_execution("DEMO-90", &TestSelection::Jql("labels = none".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NoTestsMatched(_)));
        assert!(xray.received_requests().await.unwrap().is_empty());
    }
}
