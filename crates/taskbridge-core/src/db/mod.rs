//! Database layer for taskbridge

mod connection;
mod mapping_repository;
mod migrations;
mod row;
mod status_repository;
mod task_repository;

pub use connection::Database;
pub use mapping_repository::{LibSqlMappingRepository, MappingRepository};
pub use status_repository::{LibSqlSyncStatusRepository, SyncStatusRepository};
pub use task_repository::{LibSqlTaskRepository, TaskStore};
