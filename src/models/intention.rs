//! Intention model: a named, recurring automation driven by a trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tagged condition determining when an intention becomes due.
///
/// Only [`crate::intentions::trigger`] interprets the contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Five-field cron expression evaluated in the server's local timezone.
    Cron {
        /// Cron expression, e.g. `0 9 * * *`.
        schedule: String,
    },
    /// Fixed period measured from the previous run.
    Interval {
        /// Period length in seconds.
        seconds: u64,
    },
    /// Never due on its own; run on demand only.
    Manual {},
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Cron {
            schedule: "0 9 * * *".into(),
        }
    }
}

/// A recurring automation definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Intention {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Task description run through the chat/agent capability.
    pub prompt: String,
    /// Schedule specification.
    pub trigger: Trigger,
    /// Opaque context references, resolved by other collaborators.
    pub context_sources: Vec<String>,
    /// Disabled intentions are never scheduled.
    pub enabled: bool,
    /// Creation timestamp; anchors the first scheduled occurrence.
    pub created_at: DateTime<Utc>,
    /// Start of the most recent execution.
    pub last_run: Option<DateTime<Utc>>,
    /// Next scheduled occurrence, if any.
    pub next_run: Option<DateTime<Utc>>,
    /// True exactly while an execution is in flight. Never persisted.
    #[serde(default)]
    pub running: bool,
}

/// Fields accepted when creating an intention.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NewIntention {
    /// Display name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Task description.
    #[serde(default)]
    pub prompt: String,
    /// Schedule specification.
    #[serde(default)]
    pub trigger: Trigger,
    /// Opaque context references.
    #[serde(default)]
    pub context_sources: Vec<String>,
    /// Whether the intention starts enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_name() -> String {
    "Unnamed".into()
}

fn default_enabled() -> bool {
    true
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct IntentionUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New task description.
    pub prompt: Option<String>,
    /// New schedule specification.
    pub trigger: Option<Trigger>,
    /// New context references.
    pub context_sources: Option<Vec<String>>,
    /// New enabled flag.
    pub enabled: Option<bool>,
}

impl Intention {
    /// Build an intention from creation fields with a generated identifier.
    #[must_use]
    pub fn new(fields: NewIntention, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: fields.name,
            prompt: fields.prompt,
            trigger: fields.trigger,
            context_sources: fields.context_sources,
            enabled: fields.enabled,
            created_at,
            last_run: None,
            next_run: None,
            running: false,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: IntentionUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(prompt) = update.prompt {
            self.prompt = prompt;
        }
        if let Some(trigger) = update.trigger {
            self.trigger = trigger;
        }
        if let Some(sources) = update.context_sources {
            self.context_sources = sources;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
    }
}
