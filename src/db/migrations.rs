//! In-place upgrades for databases created by older releases.
//!
//! `CREATE TABLE IF NOT EXISTS` never touches an existing table, so columns
//! added later are checked with `PRAGMA table_info` and appended when missing.

use crate::error::OmsError;
use sqlx::SqlitePool;
use tracing::info;

/// `(table, column, column definition)` for columns added after the first schema.
pub const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    ("connections", "extension_code", "TEXT NULL"),
    ("connections", "participant_id", "TEXT NULL"),
    ("nomenclature", "template_id", "INTEGER NULL"),
    ("nomenclature", "country_code", "TEXT NULL"),
    ("orders", "comment", "TEXT NULL"),
    ("api_orders", "decline_reason", "TEXT NULL"),
    ("api_orders", "created_ts", "INTEGER NULL"),
    ("marking_codes", "block_id", "TEXT NULL"),
    ("marking_codes", "report_id", "TEXT NULL"),
    ("aggregation_files", "report_id", "TEXT NULL"),
    ("api_logs", "connection_id", "INTEGER NULL"),
    ("api_logs", "error", "TEXT NULL"),
    ("api_logs", "duration_ms", "INTEGER NOT NULL DEFAULT 0"),
];

/// Column names of `table`; empty when the table does not exist.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>, OmsError> {
    let columns: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as(&format!("PRAGMA table_info({table})"))
            .fetch_all(pool)
            .await?;
    Ok(columns.into_iter().map(|(_, name, ..)| name).collect())
}

/// Entries of [`ADDED_COLUMNS`] not present in the database.
pub async fn missing_columns(
    pool: &SqlitePool,
) -> Result<Vec<(&'static str, &'static str)>, OmsError> {
    let mut missing = Vec::new();
    for (table, column, _) in ADDED_COLUMNS {
        let columns = table_columns(pool, table).await?;
        if !columns.iter().any(|c| c == column) {
            missing.push((*table, *column));
        }
    }
    Ok(missing)
}

/// Add every missing column. Returns how many were added.
pub async fn run(pool: &SqlitePool) -> Result<usize, OmsError> {
    let mut added = 0;
    for (table, column) in missing_columns(pool).await? {
        let definition = ADDED_COLUMNS
            .iter()
            .find(|(t, c, _)| *t == table && *c == column)
            .map(|(_, _, d)| *d)
            .unwrap_or("TEXT NULL");
        sqlx::query(&format!(
            "ALTER TABLE {table} ADD COLUMN {column} {definition}"
        ))
        .execute(pool)
        .await?;
        info!(table, column, "added missing column");
        added += 1;
    }
    Ok(added)
}
