//! taskbridge CLI - keep local tasks in sync with a remote workspace database

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, MappingCommands, TaskCommands};
use crate::commands::common::{resolve_db_path, resolve_user};
use crate::commands::completions::run_completions;
use crate::commands::mapping::{
    run_mapping_delete, run_mapping_list, run_mapping_set, run_mapping_show,
};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::task::{run_task_add, run_task_link, run_task_list, run_task_set};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "taskbridge=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let user = resolve_user(cli.user);

    match cli.command {
        Commands::Task { command } => match command {
            TaskCommands::Add { title } => run_task_add(&user, &title, &db_path).await?,
            TaskCommands::List { limit, json } => {
                run_task_list(&user, limit, json, &db_path).await?;
            }
            TaskCommands::Link { id, page, database } => {
                run_task_link(&user, &id, &page, &database, &db_path).await?;
            }
            TaskCommands::Set { id, field, value } => {
                run_task_set(&user, &id, &field, &value, &db_path).await?;
            }
        },
        Commands::Mapping { command } => match command {
            MappingCommands::Set {
                database,
                fields,
                strategy,
                label,
            } => {
                run_mapping_set(
                    &user,
                    &database,
                    &fields,
                    strategy.as_deref(),
                    label.as_deref(),
                    &db_path,
                )
                .await?;
            }
            MappingCommands::Show { database, json } => {
                run_mapping_show(&user, &database, json, &db_path).await?;
            }
            MappingCommands::List { json } => run_mapping_list(&user, json, &db_path).await?,
            MappingCommands::Delete { database } => {
                run_mapping_delete(&user, &database, &db_path).await?;
            }
        },
        Commands::Status { database, json } => run_status(&user, &database, json, &db_path).await?,
        Commands::Sync {
            database,
            remote_dir,
            strategy,
            json,
        } => {
            run_sync(
                &user,
                &database,
                &remote_dir,
                strategy.as_deref(),
                json,
                &db_path,
            )
            .await?;
        }
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
