//! xray-tms - Xray test management for Jira from the command line.
//!
//! Every command prints one JSON document on stdout. Failures are printed
//! as `{"error", "message"}` and exit with status 1.

mod cli;

use std::io::BufRead;
use std::path::Path;
use std::process;

use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;

use cli::{Cli, Commands, FolderCommand};
use xray_tms::api::{Command, Verb};
use xray_tms::client::{Clients, DEFAULT_SEARCH_FIELDS};
use xray_tms::config::Config;
use xray_tms::error::{AppError, Result};
use xray_tms::logging;
use xray_tms::orchestration::{into_tool_response, Orchestrator, TestCase, TestPlan};

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    let result = run(cli).await;
    let failed = result.is_err();

    let response = into_tool_response(result);
    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }

    if failed {
        tracing::warn!("Command failed");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<Value> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let profile = config.profile(cli.profile.as_deref())?;

    let connect = || Clients::from_profile(profile, &config.settings);

    match cli.command {
        Commands::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => read_token()?,
            };
            Clients::store_token(profile, &token)?;
            Ok(serde_json::json!({ "profile": profile.name, "stored": true }))
        }

        Commands::Logout => {
            Clients::delete_token(profile)?;
            Ok(serde_json::json!({ "profile": profile.name, "deleted": true }))
        }

        Commands::Issue { key } => Ok(connect()?.jira.get_issue(&key).await?),

        Commands::Search { jql, fields } => {
            let clients = connect()?;
            let fields: Vec<&str> = if fields.is_empty() {
                DEFAULT_SEARCH_FIELDS.to_vec()
            } else {
                fields.iter().map(String::as_str).collect()
            };
            let issues = clients.jira.find_by_jql(&jql, &fields).await?;
            Ok(Value::Array(issues))
        }

        Commands::CreateTest { file } => {
            let clients = connect()?;
            let case: TestCase = read_definition(&file).await?;
            let result = Orchestrator::new(clients).create_test(&case).await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::UpdateTest { key, file } => {
            let clients = connect()?;
            let case: TestCase = read_definition(&file).await?;
            let result = Orchestrator::new(clients).update_test(&key, &case).await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::CreatePlan { file } => {
            let clients = connect()?;
            let plan: TestPlan = read_definition(&file).await?;
            let result = Orchestrator::new(clients).create_test_plan(&plan).await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::MoveTests {
            project,
            folder,
            selection,
        } => {
            let clients = connect()?;
            let project = project_or_default(project, &clients)?;
            let assignment = Orchestrator::new(clients)
                .add_tests_to_folder(&project, &folder, &selection.into_selection())
                .await?;
            Ok(serde_json::to_value(assignment)?)
        }

        Commands::AddToExecution {
            execution,
            selection,
        } => {
            let clients = connect()?;
            let result = Orchestrator::new(clients)
                .add_tests_to_execution(&execution, &selection.into_selection())
                .await?;
            Ok(serde_json::to_value(result)?)
        }

        Commands::Folder(FolderCommand::Resolve {
            project,
            path,
            context,
        }) => {
            let clients = connect()?;
            let project = project_or_default(project, &clients)?;
            let project_id = clients.jira.project_id(&project).await?;
            let folder_id = clients
                .xray
                .resolve_folder_path(&context, &project_id, &path)
                .await?;
            Ok(serde_json::json!({ "path": path, "folderId": folder_id }))
        }

        Commands::Folder(FolderCommand::Create {
            project,
            parent,
            name,
            context,
        }) => {
            let clients = connect()?;
            let project = project_or_default(project, &clients)?;
            let project_id = clients.jira.project_id(&project).await?;
            let parent_id = clients
                .xray
                .resolve_folder_path(&context, &project_id, &parent)
                .await?
                .ok_or_else(|| {
                    AppError::from(xray_tms::orchestration::DomainError::FolderNotFound(parent))
                })?;
            let reply = clients
                .xray
                .create_folder(&context, &project_id, &parent_id, &name)
                .await?;
            Ok(reply.into_result("create folder")?)
        }

        Commands::Invoke {
            verb,
            route,
            body,
            scope,
        } => {
            let clients = connect()?;
            let body = body.map(|b| serde_json::from_str::<Value>(&b)).transpose()?;
            let invoker = clients.jira.invoker();
            let reply = match scope {
                Some(issue_key) => {
                    let verb: Verb = verb.parse().map_err(AppError::Other)?;
                    let mut command = Command::new(verb, route)?.with_session_scope(&issue_key);
                    if let Some(body) = body {
                        command = command.with_json(&body)?;
                    }
                    invoker.invoke(command).await?
                }
                None => invoker.invoke_parts(&verb, &route, body).await?,
            };
            Ok(reply.into_value())
        }
    }
}

fn project_or_default(project: Option<String>, clients: &Clients) -> Result<String> {
    match project {
        Some(project) => Ok(project),
        None => Ok(clients.default_project()?.to_string()),
    }
}

async fn read_definition<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

fn read_token() -> Result<String> {
    eprint!("API token: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let token = line.trim().to_string();
    if token.is_empty() {
        return Err(AppError::other("no API token given"));
    }
    Ok(token)
}
