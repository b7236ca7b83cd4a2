//! Events exchanged with connected clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::intention::{Intention, IntentionUpdate, NewIntention};
use super::reminder::ReminderView;

/// One ordered unit of execution output.
///
/// The daemon never inspects chunk contents beyond the `kind` tag it
/// assigns to its own `start`/`end`/`error` markers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionChunk {
    /// Chunk type (`start`, `message`, `error`, `end`, or agent-defined).
    pub kind: String,
    /// Remaining chunk fields, relayed untouched.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ExecutionChunk {
    /// Build a chunk with a single `content` field.
    #[must_use]
    pub fn with_content(kind: &str, content: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("content".into(), Value::String(content.into()));
        Self {
            kind: kind.to_owned(),
            fields,
        }
    }

    /// Opening boundary marker for one execution.
    #[must_use]
    pub fn start(intention_name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(
            "intention_name".into(),
            Value::String(intention_name.to_owned()),
        );
        Self {
            kind: "start".into(),
            fields,
        }
    }

    /// Closing boundary marker for one execution.
    #[must_use]
    pub fn end() -> Self {
        Self {
            kind: "end".into(),
            fields: Map::new(),
        }
    }

    /// Error-shaped chunk carrying a failure description.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::with_content("error", content)
    }

    /// The `content` field as text, if present.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.fields.get("content").and_then(Value::as_str)
    }
}

/// Inbound client action, one per WebSocket text frame.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundAction {
    /// Parse and schedule a reminder.
    AddReminder {
        /// Natural-language reminder text.
        #[serde(default)]
        message: String,
    },
    /// Delete a pending reminder.
    DeleteReminder {
        /// Reminder identifier.
        #[serde(default)]
        id: String,
    },
    /// List pending reminders.
    GetReminders {},
    /// Create an intention.
    CreateIntention(NewIntention),
    /// Apply a partial update to an intention.
    UpdateIntention {
        /// Intention identifier.
        #[serde(default)]
        id: String,
        /// Fields to change.
        #[serde(default)]
        updates: IntentionUpdate,
    },
    /// Delete an intention.
    DeleteIntention {
        /// Intention identifier.
        #[serde(default)]
        id: String,
    },
    /// Flip an intention's enabled flag.
    ToggleIntention {
        /// Intention identifier.
        #[serde(default)]
        id: String,
    },
    /// Launch an execution immediately.
    RunIntention {
        /// Intention identifier.
        #[serde(default)]
        id: String,
    },
    /// List all intentions.
    GetIntentions {},
    /// Switch this session's chat between single-shot and agent runs.
    ToggleAgent {
        /// Route `chat` through the agent when true.
        #[serde(default)]
        active: bool,
    },
    /// Chat with the language model.
    Chat {
        /// User message.
        #[serde(default)]
        message: String,
    },
}

/// Outbound event delivered to one or all connected clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Informational banner.
    Notification {
        /// Display text.
        content: String,
    },
    /// User-visible failure.
    Error {
        /// Display text.
        content: String,
    },
    /// Reply to `add_reminder`.
    ReminderAdded {
        /// The scheduled reminder.
        reminder: ReminderView,
    },
    /// Reply to `delete_reminder`.
    ReminderDeleted {
        /// Deleted reminder identifier.
        id: String,
    },
    /// Reply to `get_reminders`.
    Reminders {
        /// Pending reminders.
        reminders: Vec<ReminderView>,
    },
    /// Broadcast when a reminder fires.
    Reminder {
        /// The fired reminder.
        reminder: ReminderView,
    },
    /// Reply to `create_intention`.
    IntentionCreated {
        /// The stored intention.
        intention: Intention,
    },
    /// Reply to `update_intention`.
    IntentionUpdated {
        /// The updated intention.
        intention: Intention,
    },
    /// Reply to `delete_intention`.
    IntentionDeleted {
        /// Deleted intention identifier.
        id: String,
    },
    /// Reply to `toggle_intention`.
    IntentionToggled {
        /// The toggled intention.
        intention: Intention,
    },
    /// Reply to `get_intentions`.
    Intentions {
        /// All intentions.
        intentions: Vec<Intention>,
    },
    /// Broadcast of one execution chunk.
    IntentionEvent {
        /// Originating intention.
        intention_id: String,
        /// The relayed chunk, flattened.
        #[serde(flatten)]
        chunk: ExecutionChunk,
    },
    /// One chunk of an agent-mode chat reply.
    AgentEvent {
        /// The relayed chunk, flattened.
        #[serde(flatten)]
        chunk: ExecutionChunk,
    },
    /// Start of a chat reply.
    StreamStart {},
    /// Chat reply body.
    Message {
        /// Reply text.
        content: String,
    },
    /// End of a chat reply.
    StreamEnd {},
}

impl OutboundEvent {
    /// Convenience constructor for error events.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Serialize to the JSON text frame sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
