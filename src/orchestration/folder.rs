//! Moving tests into the test repository folder tree.

use serde::Serialize;
use tracing::{info, instrument};

use super::{DomainError, Orchestrator, Result, TestSelection};

/// Outcome of moving tests into a folder.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderAssignment {
    pub folder_id: String,
    pub path: String,
    /// Keys of the moved tests.
    pub tests: Vec<String>,
}

impl Orchestrator {
    /// Move the selected tests into the folder at `path`.
    ///
    /// The folder must already exist; nothing is moved when it does not.
    #[instrument(skip(self, selection), fields(project = %project, path = %path))]
    pub async fn add_tests_to_folder(
        &self,
        project: &str,
        path: &str,
        selection: &TestSelection,
    ) -> Result<FolderAssignment> {
        let tests = self.select_tests(selection).await?;
        let Some(context) = tests.first() else {
            return Err(DomainError::NoTestsMatched(selection.describe()));
        };

        let project_id = self.clients.jira.project_id(project).await?;
        let folder_id = self
            .clients
            .xray
            .resolve_folder_path(&context.key, &project_id, path)
            .await?
            .ok_or_else(|| DomainError::FolderNotFound(path.to_string()))?;

        let ids: Vec<String> = tests.iter().map(|t| t.id.clone()).collect();
        let replies = self
            .clients
            .xray
            .move_tests_to_folder(&context.key, &project_id, &folder_id, &ids)
            .await?;
        for reply in replies {
            reply.into_result(&format!("move tests to '{}'", path))?;
        }

        info!(count = ids.len(), folder_id = %folder_id, "Tests moved");
        Ok(FolderAssignment {
            folder_id,
            path: path.to_string(),
            tests: tests.into_iter().map(|t| t.key).collect(),
        })
    }
}
