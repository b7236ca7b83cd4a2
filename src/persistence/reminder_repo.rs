//! Reminder repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::reminder::Reminder;
use crate::Result;

use super::db::Database;
use super::parse_timestamp;

/// Repository for reminder records.
#[derive(Clone)]
pub struct ReminderRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: String,
    message: String,
    fire_at: String,
    created_at: String,
    fired: i64,
}

impl ReminderRow {
    fn into_reminder(self) -> Result<Reminder> {
        Ok(Reminder {
            fire_at: parse_timestamp("fire_at", &self.fire_at)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            id: self.id,
            message: self.message,
            fired: self.fired != 0,
        })
    }
}

impl ReminderRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a reminder record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn insert(&self, reminder: &Reminder) -> Result<()> {
        sqlx::query(
            "INSERT INTO reminder (id, message, fire_at, created_at, fired)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&reminder.id)
        .bind(&reminder.message)
        .bind(reminder.fire_at.to_rfc3339())
        .bind(reminder.created_at.to_rfc3339())
        .bind(i64::from(reminder.fired))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All reminders that have not fired, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_pending(&self) -> Result<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, message, fire_at, created_at, fired
             FROM reminder
             WHERE fired = 0
             ORDER BY fire_at ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ReminderRow::into_reminder).collect()
    }

    /// Delete a reminder by identifier. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reminder WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
