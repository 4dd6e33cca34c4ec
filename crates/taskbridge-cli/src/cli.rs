use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "taskbridge")]
#[command(about = "Keep local tasks in sync with a remote workspace database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// User the tasks and mappings belong to (defaults to $TASKBRIDGE_USER or "local")
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage local tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Manage field mappings between tasks and remote databases
    Mapping {
        #[command(subcommand)]
        command: MappingCommands,
    },
    /// Show the last sync status for a remote database
    Status {
        /// Remote database id
        database: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync cycle against a directory of exported remote pages
    Sync {
        /// Remote database id
        database: String,
        /// Directory holding one `<page id>.json` file per page
        #[arg(long, value_name = "DIR")]
        remote_dir: PathBuf,
        /// Resolution strategy (remote-wins, local-wins, latest-wins, manual)
        #[arg(long)]
        strategy: Option<String>,
        /// Output the cycle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task title
        title: Vec<String>,
    },
    /// List recently edited tasks
    List {
        /// Number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Link a task to a remote page
    Link {
        /// Task ID
        id: String,
        /// Remote page id
        #[arg(long)]
        page: String,
        /// Remote database id
        #[arg(long)]
        database: String,
    },
    /// Edit one field of a task
    Set {
        /// Task ID
        id: String,
        /// Field name (title, description, status, priority, estimate, due_date, completed)
        field: String,
        /// New value; an empty string clears optional fields
        value: String,
    },
}

#[derive(Subcommand)]
pub enum MappingCommands {
    /// Create or replace the mapping for a remote database
    Set {
        /// Remote database id
        database: String,
        /// Field mapping as field=property; repeat for each field
        #[arg(long = "field", value_name = "FIELD=PROPERTY", required = true)]
        fields: Vec<String>,
        /// Default resolution strategy for this database
        #[arg(long)]
        strategy: Option<String>,
        /// Human-readable database name
        #[arg(long)]
        label: Option<String>,
    },
    /// Show the mapping for a remote database
    Show {
        database: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all mappings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the mapping for a remote database
    Delete { database: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
