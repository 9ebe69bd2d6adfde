//! Xray facade.
//!
//! Operations on Xray's internal API: manual test steps, the test repository
//! folder tree, and test membership of plans and executions. Every call is
//! authorized by the session of a context issue key.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use super::invoke_with_retry;
use crate::api::batch::{fan_out, partition, EXECUTION_BUCKET, FOLDER_MOVE_BUCKET};
use crate::api::factory::xray;
use crate::api::types::{Folder, StepFields, StepRecord, StepsPage};
use crate::api::{ApiError, CommandInvoker, Reply, Result, RetryPolicy};
use crate::config::Settings;

/// The Xray facade.
#[derive(Debug, Clone)]
pub struct XrayClient {
    invoker: Arc<CommandInvoker>,
    retry: RetryPolicy,
    max_parallel: usize,
}

impl XrayClient {
    pub fn new(invoker: Arc<CommandInvoker>, settings: &Settings) -> Self {
        Self {
            invoker,
            retry: settings.retry_policy(),
            max_parallel: settings.parallelism(),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// The steps of a test, ordered by index.
    #[instrument(skip(self), fields(issue_key = %context_key))]
    pub async fn get_steps(&self, context_key: &str, test_id: &str) -> Result<Vec<StepRecord>> {
        let value = self
            .invoker
            .invoke(xray::get_steps(context_key, test_id)?)
            .await?
            .into_result(&format!("steps of test '{}'", context_key))?;

        // Some Xray versions return the bare array
        let mut steps = match value {
            Value::Array(_) => serde_json::from_value::<Vec<StepRecord>>(value),
            other => serde_json::from_value::<StepsPage>(other).map(|page| page.steps),
        }
        .map_err(|e| ApiError::InvalidResponse(format!("test steps: {}", e)))?;

        steps.sort_by_key(|s| s.index);
        debug!("Test has {} steps", steps.len());
        Ok(steps)
    }

    pub async fn add_step(
        &self,
        context_key: &str,
        test_id: &str,
        index: u32,
        fields: &StepFields,
    ) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "create step",
            xray::create_step(context_key, test_id, index, fields)?,
        )
        .await
    }

    pub async fn delete_step(&self, context_key: &str, test_id: &str, step_id: &str) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "delete step",
            xray::delete_step(context_key, test_id, step_id)?,
        )
        .await
    }

    /// The root of a project's test repository.
    pub async fn get_folders(&self, context_key: &str, project_id: &str) -> Result<Folder> {
        let value = self
            .invoker
            .invoke(xray::get_folders(context_key, project_id)?)
            .await?
            .into_result(&format!("folders of project {}", project_id))?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("folder tree: {}", e)))
    }

    /// Resolve a folder path such as `/Smoke/Login` to its folder id.
    ///
    /// Returns `None` when any segment does not exist.
    #[instrument(skip(self), fields(issue_key = %context_key))]
    pub async fn resolve_folder_path(
        &self,
        context_key: &str,
        project_id: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let root = self.get_folders(context_key, project_id).await?;
        let id = root.find_path(path).map(|f| f.id.clone());
        if id.is_none() {
            debug!(path, "Folder path not found");
        }
        Ok(id)
    }

    pub async fn create_folder(
        &self,
        context_key: &str,
        project_id: &str,
        parent_folder_id: &str,
        name: &str,
    ) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "create folder",
            xray::create_folder(context_key, project_id, parent_folder_id, name)?,
        )
        .await
    }

    /// Move tests into a folder. One call per bucket of ids.
    #[instrument(skip(self, test_ids), fields(count = test_ids.len()))]
    pub async fn move_tests_to_folder(
        &self,
        context_key: &str,
        project_id: &str,
        folder_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<Reply>> {
        let buckets = partition(test_ids, FOLDER_MOVE_BUCKET);
        let replies = fan_out(buckets, self.max_parallel, |bucket| async move {
            invoke_with_retry(
                &self.invoker,
                &self.retry,
                "move tests",
                xray::move_tests(context_key, project_id, folder_id, &bucket)?,
            )
            .await
        })
        .await;
        replies.into_iter().collect()
    }

    pub async fn add_tests_to_plan(
        &self,
        context_key: &str,
        plan_id: &str,
        test_ids: &[String],
    ) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "add tests to plan",
            xray::add_tests_to_plan(context_key, plan_id, test_ids)?,
        )
        .await
    }

    pub async fn remove_tests_from_plan(
        &self,
        context_key: &str,
        plan_id: &str,
        test_ids: &[String],
    ) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "remove tests from plan",
            xray::remove_tests_from_plan(context_key, plan_id, test_ids)?,
        )
        .await
    }

    /// Attach tests to an execution, in buckets of [`EXECUTION_BUCKET`].
    #[instrument(skip(self, test_ids), fields(count = test_ids.len()))]
    pub async fn add_tests_to_execution(
        &self,
        context_key: &str,
        execution_id: &str,
        test_ids: &[String],
    ) -> Result<Vec<Reply>> {
        let buckets = partition(test_ids, EXECUTION_BUCKET);
        let replies = fan_out(buckets, self.max_parallel, |bucket| async move {
            invoke_with_retry(
                &self.invoker,
                &self.retry,
                "add tests to execution",
                xray::add_tests_to_execution(context_key, execution_id, &bucket)?,
            )
            .await
        })
        .await;
        replies.into_iter().collect()
    }

    pub async fn add_preconditions(
        &self,
        context_key: &str,
        test_id: &str,
        precondition_ids: &[String],
    ) -> Result<Reply> {
        invoke_with_retry(
            &self.invoker,
            &self.retry,
            "add preconditions",
            xray::add_preconditions(context_key, test_id, precondition_ids)?,
        )
        .await
    }
}
