use std::path::Path;

use taskbridge_core::db::{LibSqlSyncStatusRepository, SyncStatusRepository};

use crate::commands::common::{format_timestamp, open_database};
use crate::error::CliError;

pub async fn run_status(
    user: &str,
    database: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let status = LibSqlSyncStatusRepository::new(db.connection())
        .get_sync_status(user, database)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match status {
        Some(status) => {
            let detail = status.error.as_deref().unwrap_or("");
            println!(
                "{}  {:<8}  {}  {detail}",
                status.database_id,
                status.state.as_str(),
                format_timestamp(status.updated_at)
            );
        }
        None => println!("{database}  never synced"),
    }
    Ok(())
}
