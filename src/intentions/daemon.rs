//! Background loop that launches scheduled and on-demand intention runs.
//!
//! Executions are spawned on a [`TaskTracker`] and never awaited by the
//! loop. Each run holds a [`RunGuard`] that releases the in-flight mark
//! when the task ends, whether the agent finished, failed, or panicked.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::models::intention::Intention;
use crate::Result;

use super::runner::ExecutionRunner;
use super::store::IntentionStore;

struct LoopHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Releases the in-flight mark when dropped.
struct RunGuard {
    store: Arc<IntentionStore>,
    id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.store.finish_run(&self.id);
    }
}

/// Shared state for launching executions from the loop and from run-now.
#[derive(Clone)]
struct Launcher {
    store: Arc<IntentionStore>,
    runner: ExecutionRunner,
    tracker: TaskTracker,
}

impl Launcher {
    /// Spawn an execution for an intention already claimed in the store.
    fn launch(&self, intention: Intention) {
        let guard = RunGuard {
            store: Arc::clone(&self.store),
            id: intention.id.clone(),
        };
        let runner = self.runner.clone();
        let span = info_span!("intention_run", intention_id = %intention.id);

        self.tracker.spawn(
            async move {
                let _guard = guard;
                info!(name = %intention.name, "intention execution started");
                runner.run(&intention).await;
            }
            .instrument(span),
        );
    }

    async fn launch_due(&self) -> usize {
        let claimed = self.store.claim_due(Utc::now()).await;
        let launched = claimed.len();
        for intention in claimed {
            self.launch(intention);
        }
        launched
    }
}

/// Drives intention executions under the at-most-one-per-intention rule.
pub struct IntentionDaemon {
    launcher: Launcher,
    poll_interval: Duration,
    shutdown_grace: Duration,
    running: Mutex<Option<LoopHandle>>,
}

impl IntentionDaemon {
    /// Construct a daemon (does not start the loop yet).
    #[must_use]
    pub fn new(
        store: Arc<IntentionStore>,
        runner: ExecutionRunner,
        poll_interval: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            launcher: Launcher {
                store,
                runner,
                tracker: TaskTracker::new(),
            },
            poll_interval,
            shutdown_grace,
            running: Mutex::new(None),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<IntentionStore> {
        &self.launcher.store
    }

    /// Whether the scheduling loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of execution tasks still alive.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.launcher.tracker.len()
    }

    /// Start the scheduling loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!("intention daemon already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let join = tokio::spawn(
            run_loop(self.launcher.clone(), self.poll_interval, cancel.clone())
                .instrument(info_span!("intention_daemon")),
        );
        *running = Some(LoopHandle { cancel, join });
        info!(poll_seconds = self.poll_interval.as_secs(), "intention daemon started");
        true
    }

    /// Launch `id` immediately, bypassing its schedule.
    ///
    /// Returns the claimed intention once its execution has been spawned;
    /// output arrives on the event channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id and
    /// `AppError::AlreadyRunning` if an execution for `id` is in flight.
    /// A rejected request is not queued.
    pub async fn run_intention_now(&self, id: &str) -> Result<Intention> {
        let intention = self.launcher.store.claim(id, Utc::now()).await?;
        info!(intention_id = %id, "on-demand intention run");
        self.launcher.launch(intention.clone());
        Ok(intention)
    }

    /// Stop the loop, then give in-flight executions `shutdown_grace` to
    /// finish. Anything still running afterwards has its in-flight mark
    /// cleared.
    pub async fn stop(&self) {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(LoopHandle { cancel, join }) = handle {
            cancel.cancel();
            if let Err(err) = join.await {
                error!(%err, "intention daemon task failed");
            }
        }

        let tracker = &self.launcher.tracker;
        tracker.close();
        if !tracker.is_empty() {
            info!(in_flight = tracker.len(), "waiting for intention executions");
        }
        if tokio::time::timeout(self.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = tracker.len(),
                grace_seconds = self.shutdown_grace.as_secs(),
                "intention executions outlived shutdown grace"
            );
            self.launcher.store.clear_running();
        }
        tracker.reopen();
        info!("intention daemon stopped");
    }
}

async fn run_loop(launcher: Launcher, poll_interval: Duration, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let tick = launcher.launch_due();
        match AssertUnwindSafe(tick).catch_unwind().await {
            Ok(0) => {}
            Ok(launched) => debug!(launched, "due intentions launched"),
            Err(panic) => error!(?panic, "intention tick panicked; continuing"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!("intention loop exited");
}
