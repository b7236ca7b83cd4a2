//! In-memory reminder collection with optional `SQLite` write-through.
//!
//! Mutations hold `writes` across both the map change and the repository
//! call, so a delete or a firing can never be overtaken by an older insert.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::models::reminder::Reminder;
use crate::persistence::reminder_repo::ReminderRepo;
use crate::Result;

/// Pending reminders keyed by identifier.
///
/// The map is the runtime source of truth. The lock is held only across
/// the mutation itself, never across an await.
pub struct ReminderStore {
    pending: Mutex<HashMap<String, Reminder>>,
    writes: tokio::sync::Mutex<()>,
    repo: Option<ReminderRepo>,
}

impl ReminderStore {
    /// Empty store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            writes: tokio::sync::Mutex::new(()),
            repo: None,
        }
    }

    /// Store backed by `repo`, preloaded with every unfired reminder.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the existing reminders cannot be loaded.
    pub async fn load(repo: ReminderRepo) -> Result<Self> {
        let existing = repo.list_pending().await?;
        info!(count = existing.len(), "reminders loaded");
        let pending = existing
            .into_iter()
            .map(|reminder| (reminder.id.clone(), reminder))
            .collect();
        Ok(Self {
            pending: Mutex::new(pending),
            writes: tokio::sync::Mutex::new(()),
            repo: Some(repo),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Reminder>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a pending reminder.
    pub async fn insert(&self, reminder: Reminder) {
        let _write = self.writes.lock().await;
        self.lock().insert(reminder.id.clone(), reminder.clone());

        if let Some(repo) = &self.repo {
            if let Err(err) = repo.insert(&reminder).await {
                error!(reminder_id = %reminder.id, %err, "failed to persist reminder");
            }
        }
    }

    /// Remove a pending reminder. Returns `false` for unknown or already
    /// fired identifiers.
    pub async fn remove_pending(&self, id: &str) -> bool {
        let _write = self.writes.lock().await;
        let removed = {
            let mut pending = self.lock();
            match pending.get(id) {
                Some(reminder) if !reminder.fired => pending.remove(id).is_some(),
                _ => false,
            }
        };

        if removed {
            self.forget(id).await;
        }
        removed
    }

    /// Atomically remove and return every reminder due at `now`, each
    /// marked fired. A reminder is returned by at most one call.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let _write = self.writes.lock().await;
        let mut due: Vec<Reminder> = {
            let mut pending = self.lock();
            let ids: Vec<String> = pending
                .values()
                .filter(|reminder| reminder.is_due(now))
                .map(|reminder| reminder.id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        due.sort_by_key(|reminder| reminder.fire_at);
        for reminder in &mut due {
            reminder.fired = true;
            self.forget(&reminder.id).await;
        }
        due
    }

    /// Earliest `fire_at` among pending reminders.
    #[must_use]
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .values()
            .filter(|reminder| !reminder.fired)
            .map(|reminder| reminder.fire_at)
            .min()
    }

    /// Snapshot of pending reminders, soonest first.
    #[must_use]
    pub fn list(&self) -> Vec<Reminder> {
        let mut reminders: Vec<Reminder> = self.lock().values().cloned().collect();
        reminders.sort_by_key(|reminder| reminder.fire_at);
        reminders
    }

    /// Number of pending reminders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no reminders are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Repository delete; callers hold `writes`.
    async fn forget(&self, id: &str) {
        if let Some(repo) = &self.repo {
            if let Err(err) = repo.delete(id).await {
                error!(reminder_id = %id, %err, "failed to delete persisted reminder");
            }
        }
    }
}
