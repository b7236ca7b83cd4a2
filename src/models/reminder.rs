//! Reminder model: a one-shot notification derived from natural-language text.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static TIME_PHRASE: OnceLock<Option<Regex>> = OnceLock::new();
static PREAMBLE: OnceLock<Option<Regex>> = OnceLock::new();

fn time_phrase_pattern() -> Option<&'static Regex> {
    TIME_PHRASE
        .get_or_init(|| {
            Regex::new(r"(?i)\b(?:in\s+\d+\s*[a-z]+|at\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\b").ok()
        })
        .as_ref()
}

fn preamble_pattern() -> Option<&'static Regex> {
    PREAMBLE
        .get_or_init(|| Regex::new(r"(?i)^\s*remind\s+me\s*(?:to\s+)?").ok())
        .as_ref()
}

/// A pending one-shot reminder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminder {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Original user text.
    pub message: String,
    /// Absolute instant at which the reminder fires; immutable.
    pub fire_at: DateTime<Utc>,
    /// Creation timestamp; immutable.
    pub created_at: DateTime<Utc>,
    /// Set once when the scheduler delivers the reminder.
    pub fired: bool,
}

impl Reminder {
    /// Construct a new pending reminder with a generated identifier.
    #[must_use]
    pub fn new(message: String, fire_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message,
            fire_at,
            created_at,
            fired: false,
        }
    }

    /// Whether the reminder is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.fired && self.fire_at <= now
    }

    /// Task description with the time phrase and "remind me to" stripped.
    ///
    /// Falls back to the full message when nothing is left.
    #[must_use]
    pub fn task(&self) -> String {
        let (Some(time_phrase), Some(preamble)) = (time_phrase_pattern(), preamble_pattern())
        else {
            return self.message.clone();
        };

        let stripped = time_phrase.replace_all(&self.message, " ");
        let stripped = preamble.replace(&stripped, "");
        let task = stripped
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c: char| c == ',' || c == '.' || c.is_whitespace())
            .to_owned();

        if task.is_empty() {
            self.message.clone()
        } else {
            task
        }
    }
}

/// Human-readable time remaining until `fire_at`, derived at read time.
///
/// Produces `"2h 5m"`, `"5m 30s"`, `"45s"`, or `"due"` once the instant
/// has passed.
#[must_use]
pub fn time_remaining(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (fire_at - now).num_seconds();
    if secs <= 0 {
        return "due".to_owned();
    }

    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        if seconds > 0 {
            format!("{minutes}m {seconds}s")
        } else {
            format!("{minutes}m")
        }
    } else {
        format!("{seconds}s")
    }
}

/// Reminder annotated with its derived time remaining, as sent to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReminderView {
    /// The reminder record.
    #[serde(flatten)]
    pub reminder: Reminder,
    /// Task description extracted from the message.
    pub task: String,
    /// Derived countdown string; never stored.
    pub time_remaining: String,
}

impl ReminderView {
    /// Annotate a reminder relative to `now`.
    #[must_use]
    pub fn at(reminder: Reminder, now: DateTime<Utc>) -> Self {
        let time_remaining = time_remaining(reminder.fire_at, now);
        let task = reminder.task();
        Self {
            reminder,
            task,
            time_remaining,
        }
    }
}
