//! Intention repository for `SQLite` persistence.
//!
//! Triggers and context sources are stored as JSON text. The in-flight
//! `running` flag is deliberately absent from the table.

use std::sync::Arc;

use crate::models::intention::{Intention, Trigger};
use crate::{AppError, Result};

use super::db::Database;
use super::{parse_optional_timestamp, parse_timestamp};

/// Repository for intention records.
#[derive(Clone)]
pub struct IntentionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct IntentionRow {
    id: String,
    name: String,
    prompt: String,
    trigger_json: String,
    context_sources: String,
    enabled: i64,
    created_at: String,
    last_run: Option<String>,
    next_run: Option<String>,
}

impl IntentionRow {
    fn into_intention(self) -> Result<Intention> {
        let trigger: Trigger = serde_json::from_str(&self.trigger_json)
            .map_err(|e| AppError::Db(format!("invalid trigger_json: {e}")))?;
        let context_sources: Vec<String> = serde_json::from_str(&self.context_sources)
            .map_err(|e| AppError::Db(format!("invalid context_sources: {e}")))?;

        Ok(Intention {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            last_run: parse_optional_timestamp("last_run", self.last_run.as_deref())?,
            next_run: parse_optional_timestamp("next_run", self.next_run.as_deref())?,
            id: self.id,
            name: self.name,
            prompt: self.prompt,
            trigger,
            context_sources,
            enabled: self.enabled != 0,
            running: false,
        })
    }
}

impl IntentionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the full intention record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the write fails.
    pub async fn upsert(&self, intention: &Intention) -> Result<()> {
        let trigger_json = serde_json::to_string(&intention.trigger)
            .map_err(|e| AppError::Db(format!("cannot encode trigger: {e}")))?;
        let context_sources = serde_json::to_string(&intention.context_sources)
            .map_err(|e| AppError::Db(format!("cannot encode context_sources: {e}")))?;

        sqlx::query(
            "INSERT INTO intention
                (id, name, prompt, trigger_json, context_sources, enabled, created_at, last_run, next_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                prompt = excluded.prompt,
                trigger_json = excluded.trigger_json,
                context_sources = excluded.context_sources,
                enabled = excluded.enabled,
                last_run = excluded.last_run,
                next_run = excluded.next_run",
        )
        .bind(&intention.id)
        .bind(&intention.name)
        .bind(&intention.prompt)
        .bind(trigger_json)
        .bind(context_sources)
        .bind(i64::from(intention.enabled))
        .bind(intention.created_at.to_rfc3339())
        .bind(intention.last_run.map(|t| t.to_rfc3339()))
        .bind(intention.next_run.map(|t| t.to_rfc3339()))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All intentions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or row decoding fails.
    pub async fn list(&self) -> Result<Vec<Intention>> {
        let rows: Vec<IntentionRow> = sqlx::query_as(
            "SELECT id, name, prompt, trigger_json, context_sources, enabled,
                    created_at, last_run, next_run
             FROM intention
             ORDER BY created_at ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(IntentionRow::into_intention).collect()
    }

    /// Delete an intention by identifier. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM intention WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
