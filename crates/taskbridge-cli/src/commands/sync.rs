use std::path::Path;

use taskbridge_core::config::SyncSettings;
use taskbridge_core::remote::DirectoryRemote;
use taskbridge_core::{CycleReport, ResolutionStrategy, SyncEngine};
use tokio_util::sync::CancellationToken;

use crate::commands::common::{format_conflict_line, format_failure_line, open_database};
use crate::error::CliError;

pub async fn sync_database(
    user: &str,
    database: &str,
    remote_dir: &Path,
    strategy: Option<&str>,
    db_path: &Path,
) -> Result<CycleReport, CliError> {
    let settings = SyncSettings::from_env()?;
    let strategy = strategy.map(|raw| ResolutionStrategy::parse_or_default(Some(raw)));

    let db = open_database(db_path).await?;
    let engine = SyncEngine::new(&db, DirectoryRemote::new(remote_dir), settings);

    // Ctrl-C stops the cycle between field writes.
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current field");
                cancel.cancel();
            }
        })
    };

    let report = engine
        .run_sync_cycle_with_cancel(user, database, strategy, &cancel)
        .await;
    interrupt.abort();

    let report = report?;
    tracing::debug!(stats = ?engine.gate().stats(), "Rate gate usage");
    Ok(report)
}

pub async fn run_sync(
    user: &str,
    database: &str,
    remote_dir: &Path,
    strategy: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let report = sync_database(user, database, remote_dir, strategy, db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }

    if report.outcome.is_success() {
        Ok(())
    } else {
        Err(CliError::SyncIncomplete(
            report
                .status
                .error
                .unwrap_or_else(|| format!("{:?}", report.outcome)),
        ))
    }
}

pub fn format_report_lines(report: &CycleReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  strategy={}  applied={}  manual={}  failed={}  status={}",
        report.database_id,
        report.strategy,
        report.applied_count,
        report.manual_conflicts.len(),
        report.failures.len(),
        report.status.state
    )];
    lines.extend(report.manual_conflicts.iter().map(format_conflict_line));
    lines.extend(report.failures.iter().map(format_failure_line));
    lines
}
