//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use xray_tms::orchestration::TestSelection;

#[derive(Parser, Debug)]
#[command(name = "xray-tms", version, about = "Manage Xray tests in Jira from the command line")]
pub struct Cli {
    /// Profile to use (defaults to settings.default_profile)
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Path to config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store the profile's API token in the OS keyring (read from stdin when omitted)
    Login {
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove the profile's API token from the OS keyring
    Logout,

    /// Show an issue as JSON
    Issue { key: String },

    /// Run a JQL search, walking every page
    Search {
        jql: String,

        /// Comma-separated fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Create a test with steps from a JSON definition
    CreateTest { file: PathBuf },

    /// Replace an existing test's fields and steps from a JSON definition
    UpdateTest { key: String, file: PathBuf },

    /// Create a test plan from a JSON definition
    CreatePlan { file: PathBuf },

    /// Move tests into a test repository folder
    MoveTests {
        /// Project key (defaults to the profile's project)
        #[arg(long)]
        project: Option<String>,

        /// Folder path, e.g. /Smoke/Login
        #[arg(long)]
        folder: String,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Add tests to an existing test execution
    AddToExecution {
        execution: String,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Test repository folders
    #[command(subcommand)]
    Folder(FolderCommand),

    /// Send a raw request through the command invoker
    Invoke {
        /// GET, POST, PUT or DELETE
        verb: String,

        /// Route relative to the API base, e.g. /rest/api/3/myself
        route: String,

        /// JSON body
        #[arg(long)]
        body: Option<String>,

        /// Send to Xray under the session of this issue key
        #[arg(long)]
        scope: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FolderCommand {
    /// Print the id of a folder path
    Resolve {
        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        path: String,

        /// Issue key whose session authorizes the lookup
        #[arg(long)]
        context: String,
    },

    /// Create a folder under an existing parent path
    Create {
        #[arg(long)]
        project: Option<String>,

        /// Parent folder path, `/` for the repository root
        #[arg(long, default_value = "/")]
        parent: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        context: String,
    },
}

/// Select tests by key list or JQL.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SelectionArgs {
    /// Comma-separated issue keys
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,

    #[arg(long)]
    pub jql: Option<String>,
}

impl SelectionArgs {
    pub fn into_selection(self) -> TestSelection {
        match self.jql {
            Some(jql) => TestSelection::Jql(jql),
            None => TestSelection::Keys(self.keys),
        }
    }
}
