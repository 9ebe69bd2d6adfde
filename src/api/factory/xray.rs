//! Commands for Xray's internal test-management API.
//!
//! Every command here is session-scoped: the `context_key` argument is the
//! issue key whose session token authorizes the call. Ids are Jira issue ids
//! (numeric strings), not keys.

use crate::api::command::Command;
use crate::api::error::Result;
use crate::api::types::{
    CreateFolderRequest, MoveTestsRequest, PreconditionIdsRequest, StepFields, StepRequest,
    TestIdsRequest,
};

/// Route prefix of the Xray internal API.
pub const API_PREFIX: &str = "/api/internal";

/// Largest page of steps requested at once.
pub const MAX_STEPS_PAGE: u32 = 100;

pub fn get_steps(context_key: &str, test_id: &str) -> Result<Command> {
    Ok(Command::get(format!(
        "{}/test/{}/steps?startAt=0&maxResults={}",
        API_PREFIX, test_id, MAX_STEPS_PAGE
    ))?
    .with_session_scope(context_key))
}

pub fn create_step(
    context_key: &str,
    test_id: &str,
    index: u32,
    fields: &StepFields,
) -> Result<Command> {
    let request = StepRequest {
        index,
        fields: fields.clone(),
    };
    Ok(Command::post(format!("{}/test/{}/step", API_PREFIX, test_id))?
        .with_json(&request)?
        .with_session_scope(context_key))
}

pub fn update_step(
    context_key: &str,
    test_id: &str,
    step_id: &str,
    index: u32,
    fields: &StepFields,
) -> Result<Command> {
    let request = StepRequest {
        index,
        fields: fields.clone(),
    };
    Ok(
        Command::put(format!("{}/test/{}/step/{}", API_PREFIX, test_id, step_id))?
            .with_json(&request)?
            .with_session_scope(context_key),
    )
}

pub fn delete_step(context_key: &str, test_id: &str, step_id: &str) -> Result<Command> {
    Ok(
        Command::delete(format!("{}/test/{}/step/{}", API_PREFIX, test_id, step_id))?
            .with_session_scope(context_key),
    )
}

/// The folder tree of a project's test repository.
pub fn get_folders(context_key: &str, project_id: &str) -> Result<Command> {
    Ok(Command::get(format!(
        "{}/test-repository/{}/folders",
        API_PREFIX, project_id
    ))?
    .with_session_scope(context_key))
}

pub fn create_folder(
    context_key: &str,
    project_id: &str,
    parent_folder_id: &str,
    name: &str,
) -> Result<Command> {
    let request = CreateFolderRequest {
        project_id: project_id.to_string(),
        parent_folder_id: parent_folder_id.to_string(),
        name: name.to_string(),
    };
    Ok(Command::post(format!("{}/test-repository/folders", API_PREFIX))?
        .with_json(&request)?
        .with_session_scope(context_key))
}

pub fn move_tests(
    context_key: &str,
    project_id: &str,
    folder_id: &str,
    test_ids: &[String],
) -> Result<Command> {
    let request = MoveTestsRequest {
        project_id: project_id.to_string(),
        folder_id: folder_id.to_string(),
        test_issue_ids: test_ids.to_vec(),
    };
    Ok(Command::put(format!("{}/test-repository/move-tests", API_PREFIX))?
        .with_json(&request)?
        .with_session_scope(context_key))
}

pub fn add_tests_to_plan(context_key: &str, plan_id: &str, test_ids: &[String]) -> Result<Command> {
    let request = TestIdsRequest {
        test_issue_ids: test_ids.to_vec(),
    };
    Ok(Command::post(format!("{}/testplan/{}/tests", API_PREFIX, plan_id))?
        .with_json(&request)?
        .with_session_scope(context_key))
}

pub fn remove_tests_from_plan(
    context_key: &str,
    plan_id: &str,
    test_ids: &[String],
) -> Result<Command> {
    let request = TestIdsRequest {
        test_issue_ids: test_ids.to_vec(),
    };
    Ok(Command::delete(format!("{}/testplan/{}/tests", API_PREFIX, plan_id))?
        .with_json(&request)?
        .with_session_scope(context_key))
}

pub fn add_tests_to_execution(
    context_key: &str,
    execution_id: &str,
    test_ids: &[String],
) -> Result<Command> {
    let request = TestIdsRequest {
        test_issue_ids: test_ids.to_vec(),
    };
    Ok(
        Command::post(format!("{}/testexec/{}/tests", API_PREFIX, execution_id))?
            .with_json(&request)?
            .with_session_scope(context_key),
    )
}

pub fn add_preconditions(
    context_key: &str,
    test_id: &str,
    precondition_ids: &[String],
) -> Result<Command> {
    let request = PreconditionIdsRequest {
        precondition_issue_ids: precondition_ids.to_vec(),
    };
    Ok(
        Command::post(format!("{}/test/{}/preconditions", API_PREFIX, test_id))?
            .with_json(&request)?
            .with_session_scope(context_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::command::{Body, Verb};

    #[test]
    fn test_every_command_is_session_scoped() {
        let fields = StepFields::default();
        let ids = vec!["1".to_string()];
        let commands = vec![
            get_steps("DEMO-1", "100").unwrap(),
            create_step("DEMO-1", "100", 0, &fields).unwrap(),
            update_step("DEMO-1", "100", "s1", 0, &fields).unwrap(),
            delete_step("DEMO-1", "100", "s1").unwrap(),
            get_folders("DEMO-1", "10000").unwrap(),
            create_folder("DEMO-1", "10000", "root", "Smoke").unwrap(),
            move_tests("DEMO-1", "10000", "f1", &ids).unwrap(),
            add_tests_to_plan("DEMO-1", "200", &ids).unwrap(),
            remove_tests_from_plan("DEMO-1", "200", &ids).unwrap(),
            add_tests_to_execution("DEMO-1", "300", &ids).unwrap(),
            add_preconditions("DEMO-1", "100", &ids).unwrap(),
        ];

        for cmd in commands {
            assert_eq!(cmd.session_scope(), Some("DEMO-1"), "{}", cmd.route());
            assert!(cmd.route().starts_with(API_PREFIX));
        }
    }

    #[test]
    fn test_create_step_carries_index() {
        let fields = StepFields {
            action: "enter credentials".to_string(),
            data: String::new(),
            expected_result: "dashboard shown".to_string(),
        };
        let cmd = create_step("DEMO-3", "10003", 1, &fields).unwrap();

        assert_eq!(cmd.verb(), Verb::Post);
        assert_eq!(cmd.route(), "/api/internal/test/10003/step");
        match cmd.body() {
            Some(Body::Json(v)) => {
                assert_eq!(v["index"], 1);
                assert_eq!(v["fields"]["Action"], "enter credentials");
            }
            other => panic!("Expected JSON body, got {:?}", other),
        }
    }

    #[test]
    fn test_move_tests_body() {
        let ids = vec!["11".to_string(), "12".to_string()];
        let cmd = move_tests("DEMO-11", "10000", "f9", &ids).unwrap();
        assert_eq!(cmd.verb(), Verb::Put);
        match cmd.body() {
            Some(Body::Json(v)) => {
                assert_eq!(v["folderId"], "f9");
                assert_eq!(v["testIssueIds"][1], "12");
            }
            other => panic!("Expected JSON body, got {:?}", other),
        }
    }
}
