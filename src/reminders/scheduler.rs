//! Background loop that delivers each due reminder exactly once.
//!
//! The loop sleeps until the earliest pending `fire_at` (bounded by the
//! poll interval), re-checks on waking, and publishes one
//! [`OutboundEvent::Reminder`] per fired reminder on the event channel.
//! `add` and `delete` wake the loop so a newly added earlier reminder is
//! not delayed by a long sleep.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use futures_util::FutureExt;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::event::OutboundEvent;
use crate::models::reminder::{Reminder, ReminderView};

use super::parser::parse_fire_time;
use super::store::ReminderStore;

struct LoopHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Owner of the reminder store and its delivery loop.
pub struct ReminderScheduler {
    store: Arc<ReminderStore>,
    poll_interval: Duration,
    wake: Arc<Notify>,
    running: Mutex<Option<LoopHandle>>,
}

impl ReminderScheduler {
    /// Construct a scheduler (does not start the loop yet).
    #[must_use]
    pub fn new(store: Arc<ReminderStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
            wake: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    /// Parse `message` relative to the local clock and schedule it.
    ///
    /// Returns `None`, without touching the store, when no time phrase
    /// could be recognized.
    pub async fn add(&self, message: &str) -> Option<Reminder> {
        self.add_at(message, &Local::now()).await
    }

    /// Parse `message` relative to `now` and schedule it.
    pub async fn add_at<Tz: TimeZone>(&self, message: &str, now: &DateTime<Tz>) -> Option<Reminder> {
        let Some(fire_at) = parse_fire_time(message, now) else {
            debug!("reminder text has no recognizable time phrase");
            return None;
        };

        let reminder = Reminder::new(
            message.to_owned(),
            fire_at.with_timezone(&Utc),
            now.with_timezone(&Utc),
        );
        self.store.insert(reminder.clone()).await;
        self.wake.notify_one();

        info!(reminder_id = %reminder.id, fire_at = %reminder.fire_at, "reminder scheduled");
        Some(reminder)
    }

    /// Delete a pending reminder. Returns whether it existed and was pending.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.store.remove_pending(id).await;
        if removed {
            self.wake.notify_one();
            info!(reminder_id = %id, "reminder deleted");
        }
        removed
    }

    /// Pending reminders, soonest first.
    #[must_use]
    pub fn list(&self) -> Vec<Reminder> {
        self.store.list()
    }

    /// Pending reminders annotated with time remaining at `now`.
    #[must_use]
    pub fn views(&self, now: DateTime<Utc>) -> Vec<ReminderView> {
        self.list()
            .into_iter()
            .map(|reminder| ReminderView::at(reminder, now))
            .collect()
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<ReminderStore> {
        &self.store
    }

    /// Whether the delivery loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start the delivery loop. Returns `false` if it was already running.
    pub fn start(&self, events: mpsc::UnboundedSender<OutboundEvent>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!("reminder scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(
            run_loop(
                Arc::clone(&self.store),
                Arc::clone(&self.wake),
                self.poll_interval,
                events,
                cancel.clone(),
            )
            .instrument(info_span!("reminder_scheduler")),
        );
        *running = Some(LoopHandle { cancel, join });
        info!("reminder scheduler started");
        true
    }

    /// Stop the delivery loop and wait for it to exit.
    ///
    /// No reminder is published after this returns.
    pub async fn stop(&self) {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(LoopHandle { cancel, join }) = handle {
            cancel.cancel();
            if let Err(err) = join.await {
                error!(%err, "reminder scheduler task failed");
            }
            info!("reminder scheduler stopped");
        }
    }
}

async fn run_loop(
    store: Arc<ReminderStore>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<OutboundEvent>,
    cancel: CancellationToken,
) {
    loop {
        let wait = match store.next_fire_at() {
            Some(fire_at) => (fire_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(poll_interval),
            None => poll_interval,
        };

        if !wait.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = wake.notified() => continue,
                () = tokio::time::sleep(wait) => {}
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        let tick = fire_due(&store, &events);
        if let Err(panic) = AssertUnwindSafe(tick).catch_unwind().await {
            error!(?panic, "reminder tick panicked; continuing");
        }
    }
    debug!("reminder loop exited");
}

async fn fire_due(store: &ReminderStore, events: &mpsc::UnboundedSender<OutboundEvent>) {
    let now = Utc::now();
    for reminder in store.take_due(now).await {
        info!(reminder_id = %reminder.id, "reminder fired");
        let event = OutboundEvent::Reminder {
            reminder: ReminderView::at(reminder, now),
        };
        if events.send(event).is_err() {
            warn!("event channel closed; fired reminder not broadcast");
        }
    }
}
