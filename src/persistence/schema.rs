//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`; safe to
//! re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS reminder (
    id              TEXT PRIMARY KEY NOT NULL,
    message         TEXT NOT NULL,
    fire_at         TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    fired           INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS intention (
    id              TEXT PRIMARY KEY NOT NULL,
    name            TEXT NOT NULL,
    prompt          TEXT NOT NULL,
    trigger_json    TEXT NOT NULL,
    context_sources TEXT NOT NULL,
    enabled         INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    last_run        TEXT,
    next_run        TEXT
);

CREATE INDEX IF NOT EXISTS idx_reminder_fire_at ON reminder(fire_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
