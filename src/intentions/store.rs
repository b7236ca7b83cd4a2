//! Intention collection with the in-flight set that enforces
//! at-most-one execution per intention.
//!
//! Definitions and the in-flight set live under one lock, so the daemon's
//! due-check and the claim that marks a run in flight happen as a single
//! test-and-set. That lock is never held across an await.
//!
//! Every mutation that reaches the database also holds `writes` from the
//! in-memory change until the repository call returns, so the database
//! applies mutations in the same order memory did.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::models::intention::{Intention, IntentionUpdate, NewIntention};
use crate::persistence::intention_repo::IntentionRepo;
use crate::{AppError, Result};

use super::trigger;

#[derive(Default)]
struct Inner {
    intentions: HashMap<String, Intention>,
    running: HashSet<String>,
}

impl Inner {
    fn snapshot(&self, id: &str) -> Option<Intention> {
        self.intentions.get(id).map(|intention| {
            let mut copy = intention.clone();
            copy.running = self.running.contains(id);
            copy
        })
    }

    /// Mark `id` in flight and advance its schedule.
    fn begin_run(&mut self, id: &str, now: DateTime<Utc>) -> Option<Intention> {
        let intention = self.intentions.get_mut(id)?;
        intention.last_run = Some(now);
        intention.next_run = trigger::next_occurrence(intention, now);
        self.running.insert(id.to_owned());
        let mut copy = intention.clone();
        copy.running = true;
        Some(copy)
    }
}

/// Intention definitions keyed by identifier.
pub struct IntentionStore {
    inner: Mutex<Inner>,
    writes: tokio::sync::Mutex<()>,
    repo: Option<IntentionRepo>,
}

impl IntentionStore {
    /// Empty store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_repo(Inner::default(), None)
    }

    /// Store backed by `repo`, preloaded with every saved intention.
    ///
    /// Rows saved without a `next_run` get one computed from `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the saved intentions cannot be loaded.
    pub async fn load(repo: IntentionRepo) -> Result<Self> {
        let existing = repo.list().await?;
        info!(count = existing.len(), "intentions loaded");
        let now = Utc::now();
        let intentions = existing
            .into_iter()
            .map(|mut intention| {
                if intention.next_run.is_none() {
                    intention.next_run = trigger::next_occurrence(&intention, now);
                }
                (intention.id.clone(), intention)
            })
            .collect();
        Ok(Self::with_repo(
            Inner {
                intentions,
                running: HashSet::new(),
            },
            Some(repo),
        ))
    }

    fn with_repo(inner: Inner, repo: Option<IntentionRepo>) -> Self {
        Self {
            inner: Mutex::new(inner),
            writes: tokio::sync::Mutex::new(()),
            repo,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and store a new intention.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty prompt or a trigger that
    /// could never fire; nothing is stored in that case.
    pub async fn create(&self, fields: NewIntention, now: DateTime<Utc>) -> Result<Intention> {
        if fields.prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".into()));
        }
        trigger::validate(&fields.trigger)?;

        let mut intention = Intention::new(fields, now);
        intention.next_run = trigger::next_occurrence(&intention, now);

        let _write = self.writes.lock().await;
        self.lock()
            .intentions
            .insert(intention.id.clone(), intention.clone());
        self.persist(&intention).await;

        info!(intention_id = %intention.id, name = %intention.name, "intention created");
        Ok(intention)
    }

    /// Current state of one intention.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Intention> {
        self.lock().snapshot(id)
    }

    /// Apply a partial update. Returns `Ok(None)` for an unknown id.
    ///
    /// A changed trigger, or re-enabling a disabled intention, reschedules
    /// it from `now`: occurrences before the edit are not caught up.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the update carries an invalid
    /// trigger or blanks the prompt; the stored record is left untouched.
    pub async fn update(
        &self,
        id: &str,
        update: IntentionUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Intention>> {
        if let Some(trigger) = &update.trigger {
            trigger::validate(trigger)?;
        }
        if update
            .prompt
            .as_deref()
            .is_some_and(|prompt| prompt.trim().is_empty())
        {
            return Err(AppError::Validation("prompt must not be empty".into()));
        }

        let _write = self.writes.lock().await;
        let updated = {
            let mut inner = self.lock();
            let Some(intention) = inner.intentions.get_mut(id) else {
                return Ok(None);
            };
            let was_enabled = intention.enabled;
            let trigger_changed = update
                .trigger
                .as_ref()
                .is_some_and(|trigger| *trigger != intention.trigger);
            intention.apply(update);
            if trigger_changed || (intention.enabled && !was_enabled) {
                intention.next_run = trigger::next_occurrence(intention, now);
            }
            inner.snapshot(id)
        };

        if let Some(intention) = &updated {
            self.persist(intention).await;
            info!(intention_id = %id, "intention updated");
        }
        Ok(updated)
    }

    /// Remove an intention. An in-flight execution runs to completion.
    pub async fn delete(&self, id: &str) -> bool {
        let _write = self.writes.lock().await;
        let removed = self.lock().intentions.remove(id).is_some();
        if removed {
            if let Some(repo) = &self.repo {
                if let Err(err) = repo.delete(id).await {
                    error!(intention_id = %id, %err, "failed to delete persisted intention");
                }
            }
            info!(intention_id = %id, "intention deleted");
        }
        removed
    }

    /// Every intention, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Intention> {
        let inner = self.lock();
        let mut all: Vec<Intention> = inner
            .intentions
            .keys()
            .filter_map(|id| inner.snapshot(id))
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Flip `enabled`. Returns `None` for an unknown id.
    ///
    /// Re-enabling reschedules from the current time.
    pub async fn toggle(&self, id: &str) -> Option<Intention> {
        self.toggle_at(id, Utc::now()).await
    }

    /// [`toggle`](Self::toggle) against an explicit clock.
    pub async fn toggle_at(&self, id: &str, now: DateTime<Utc>) -> Option<Intention> {
        let _write = self.writes.lock().await;
        let toggled = {
            let mut inner = self.lock();
            let intention = inner.intentions.get_mut(id)?;
            intention.enabled = !intention.enabled;
            if intention.enabled {
                intention.next_run = trigger::next_occurrence(intention, now);
            }
            inner.snapshot(id)
        };

        if let Some(intention) = &toggled {
            self.persist(intention).await;
            info!(intention_id = %id, enabled = intention.enabled, "intention toggled");
        }
        toggled
    }

    /// Atomically claim every enabled, idle intention that is due at `now`.
    ///
    /// Each returned intention is already marked in flight with `last_run`
    /// and `next_run` advanced; the caller must eventually release it with
    /// [`finish_run`](Self::finish_run).
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Vec<Intention> {
        let _write = self.writes.lock().await;
        let claimed: Vec<Intention> = {
            let mut inner = self.lock();
            let due: Vec<String> = inner
                .intentions
                .values()
                .filter(|intention| {
                    intention.enabled
                        && !inner.running.contains(&intention.id)
                        && trigger::due(intention, now)
                })
                .map(|intention| intention.id.clone())
                .collect();
            due.iter().filter_map(|id| inner.begin_run(id, now)).collect()
        };

        for intention in &claimed {
            self.persist(intention).await;
        }
        claimed
    }

    /// Claim one intention regardless of its schedule or enabled flag.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id and
    /// `AppError::AlreadyRunning` while an execution is in flight.
    pub async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Intention> {
        let _write = self.writes.lock().await;
        let claimed = {
            let mut inner = self.lock();
            if !inner.intentions.contains_key(id) {
                return Err(AppError::NotFound(format!("intention {id}")));
            }
            if inner.running.contains(id) {
                return Err(AppError::AlreadyRunning(format!("intention {id}")));
            }
            inner
                .begin_run(id, now)
                .ok_or_else(|| AppError::NotFound(format!("intention {id}")))?
        };

        self.persist(&claimed).await;
        Ok(claimed)
    }

    /// Release the in-flight mark for `id`.
    pub fn finish_run(&self, id: &str) {
        self.lock().running.remove(id);
    }

    /// Whether an execution for `id` is in flight.
    #[must_use]
    pub fn is_running(&self, id: &str) -> bool {
        self.lock().running.contains(id)
    }

    /// Number of executions in flight.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Drop every in-flight mark. Returns how many were cleared.
    pub fn clear_running(&self) -> usize {
        let mut inner = self.lock();
        let cleared = inner.running.len();
        inner.running.clear();
        if cleared > 0 {
            warn!(cleared, "cleared in-flight intention runs");
        }
        cleared
    }

    /// Write-through; callers hold `writes`.
    async fn persist(&self, intention: &Intention) {
        if let Some(repo) = &self.repo {
            if let Err(err) = repo.upsert(intention).await {
                error!(intention_id = %intention.id, %err, "failed to persist intention");
            }
        }
    }
}
