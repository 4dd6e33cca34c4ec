use std::path::Path;

use taskbridge_core::config::SyncSettings;
use taskbridge_core::db::{LibSqlMappingRepository, MappingRepository};
use taskbridge_core::models::MappingConfig;
use taskbridge_core::{FieldMapping, ResolutionStrategy};

use crate::commands::common::{
    format_mapping_lines, normalize_identifier, open_database, parse_field_specs,
};
use crate::error::CliError;

pub async fn save_mapping(
    user: &str,
    database: &str,
    field_specs: &[String],
    strategy: Option<&str>,
    label: Option<&str>,
    db_path: &Path,
) -> Result<FieldMapping, CliError> {
    let database = normalize_identifier(database).ok_or(CliError::EmptyValue("Database id"))?;
    let fields = parse_field_specs(field_specs)?;
    let default_strategy = match strategy {
        Some(raw) => raw.parse::<ResolutionStrategy>()?,
        None => SyncSettings::from_env()?.default_strategy,
    };

    let mapping = FieldMapping::new(user, &database, fields).with_config(MappingConfig {
        default_strategy,
        label: label.and_then(normalize_identifier),
    });

    let db = open_database(db_path).await?;
    Ok(LibSqlMappingRepository::new(db.connection())
        .save_mapping(&mapping)
        .await?)
}

pub async fn run_mapping_set(
    user: &str,
    database: &str,
    field_specs: &[String],
    strategy: Option<&str>,
    label: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mapping = save_mapping(user, database, field_specs, strategy, label, db_path).await?;
    for line in format_mapping_lines(&mapping) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_mapping_show(
    user: &str,
    database: &str,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mapping = LibSqlMappingRepository::new(db.connection())
        .get_mapping(user, database)
        .await?
        .ok_or_else(|| CliError::MappingNotFound(database.to_string()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&mapping)?);
    } else {
        for line in format_mapping_lines(&mapping) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_mapping_list(user: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let mappings = LibSqlMappingRepository::new(db.connection())
        .list_mappings(user)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&mappings)?);
        return Ok(());
    }
    if mappings.is_empty() {
        println!("No mappings configured.");
        return Ok(());
    }
    for mapping in &mappings {
        for line in format_mapping_lines(mapping) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_mapping_delete(user: &str, database: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let deleted = LibSqlMappingRepository::new(db.connection())
        .delete_mapping(user, database)
        .await?;

    if !deleted {
        return Err(CliError::MappingNotFound(database.to_string()));
    }
    println!("{database}");
    Ok(())
}
