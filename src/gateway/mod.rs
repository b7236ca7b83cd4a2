//! WebSocket gateway: per-connection sessions, the broadcast hub, and the
//! HTTP server that hosts them.

pub mod hub;
pub mod server;
pub mod session;

use std::sync::Arc;

use crate::agent::ChatAgent;
use crate::config::GlobalConfig;
use crate::intentions::IntentionDaemon;
use crate::reminders::ReminderScheduler;

pub use hub::{spawn_event_pump, BroadcastHub, ConnectionId, Registration};

/// Shared application state handed to every session.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Reminder scheduler and its store.
    pub reminders: Arc<ReminderScheduler>,
    /// Intention daemon and its store.
    pub daemon: Arc<IntentionDaemon>,
    /// Language-model capability used by the `chat` action.
    pub agent: Arc<dyn ChatAgent>,
    /// Connection registry.
    pub hub: Arc<BroadcastHub>,
}
