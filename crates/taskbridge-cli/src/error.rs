use std::io;

use taskbridge_core::config::ConfigError;
use taskbridge_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] taskbridge_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    LibSql(#[from] libsql::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("No mapping for remote database: {0}")]
    MappingNotFound(String),
    #[error("Invalid field mapping '{0}', expected field=property")]
    InvalidFieldSpec(String),
    #[error("Could not resolve a data directory; pass --db-path")]
    DataDirUnavailable,
    #[error("Sync cycle did not complete: {0}")]
    SyncIncomplete(String),
}
