//! Per-connection request/response loop.
//!
//! Inbound frames are handled strictly one at a time. Replies and hub
//! broadcasts share the session's bounded outbound queue, which a writer
//! task drains into the socket. Every send on either side gives up as soon
//! as the hub evicts the session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::event::{InboundAction, OutboundEvent};
use crate::models::reminder::ReminderView;
use crate::AppError;

use super::hub::Registration;
use super::AppState;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection reply channel and mode flags.
pub struct SessionHandle {
    reply: mpsc::Sender<OutboundEvent>,
    evicted: CancellationToken,
    agent_active: bool,
}

impl SessionHandle {
    /// Handle replying on `reply` until `evicted` fires.
    #[must_use]
    pub fn new(reply: mpsc::Sender<OutboundEvent>, evicted: CancellationToken) -> Self {
        Self {
            reply,
            evicted,
            agent_active: false,
        }
    }

    /// Whether `chat` is routed through the agent's streaming run.
    #[must_use]
    pub fn agent_active(&self) -> bool {
        self.agent_active
    }

    /// Queue `event` for this session.
    ///
    /// Returns `false` once the queue is closed or the session has been
    /// evicted; a full queue blocks only until eviction.
    pub async fn send(&self, event: OutboundEvent) -> bool {
        tokio::select! {
            biased;
            () = self.evicted.cancelled() => {
                debug!("session evicted, reply dropped");
                false
            }
            sent = self.reply.send(event) => {
                if sent.is_err() {
                    debug!("session outbound queue closed");
                }
                sent.is_ok()
            }
        }
    }
}

/// Serve one WebSocket connection until the client leaves or the hub
/// evicts it.
pub async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut frames) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundEvent>(state.config.connection_buffer);
    let Registration { id, evicted } = state.hub.register(tx.clone());
    info!(connection_id = id, "client connected");

    let writer_evicted = evicted.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                () = writer_evicted.cancelled() => return,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let text = match event.to_json() {
                Ok(text) => text,
                Err(err) => {
                    warn!(%err, "failed to encode outbound event");
                    continue;
                }
            };
            tokio::select! {
                biased;
                () = writer_evicted.cancelled() => return,
                sent = sink.send(Message::Text(text.into())) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        if let Err(err) = sink.close().await {
            debug!(%err, "socket close failed");
        }
    });

    let mut session = SessionHandle::new(tx, evicted.clone());
    session
        .send(OutboundEvent::Notification {
            content: "Connected".into(),
        })
        .await;

    loop {
        let frame = tokio::select! {
            () = evicted.cancelled() => {
                warn!(connection_id = id, "connection evicted by hub");
                break;
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => handle_frame(&state, &mut session, text.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                debug!(connection_id = id, %err, "websocket receive error");
                break;
            }
        }
    }

    state.hub.unregister(id);
    drop(session);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    info!(connection_id = id, "client disconnected");
}

/// Decode one text frame and dispatch it.
///
/// Malformed JSON and unknown actions produce an `error` reply; the
/// session stays open.
pub async fn handle_frame(state: &AppState, session: &mut SessionHandle, text: &str) {
    match serde_json::from_str::<InboundAction>(text) {
        Ok(action) => dispatch(state, session, action).await,
        Err(err) => {
            debug!(%err, "rejected inbound frame");
            session
                .send(OutboundEvent::error(format!("Invalid request: {err}")))
                .await;
        }
    }
}

/// Execute one inbound action, sending its replies through `session`.
pub async fn dispatch(state: &AppState, session: &mut SessionHandle, action: InboundAction) {
    let intentions = state.daemon.store();

    let event = match action {
        InboundAction::AddReminder { message } => match state.reminders.add(&message).await {
            Some(reminder) => OutboundEvent::ReminderAdded {
                reminder: ReminderView::at(reminder, Utc::now()),
            },
            None => OutboundEvent::error(
                "Could not parse time from message. Try 'in 5 minutes' or 'at 3pm'",
            ),
        },
        InboundAction::DeleteReminder { id } => {
            if state.reminders.delete(&id).await {
                OutboundEvent::ReminderDeleted { id }
            } else {
                OutboundEvent::error("Reminder not found")
            }
        }
        InboundAction::GetReminders {} => OutboundEvent::Reminders {
            reminders: state.reminders.views(Utc::now()),
        },
        InboundAction::CreateIntention(fields) => {
            match intentions.create(fields, Utc::now()).await {
                Ok(intention) => OutboundEvent::IntentionCreated { intention },
                Err(err) => OutboundEvent::error(format!("Failed to create intention: {err}")),
            }
        }
        InboundAction::UpdateIntention { id, updates } => {
            match intentions.update(&id, updates, Utc::now()).await {
                Ok(Some(intention)) => OutboundEvent::IntentionUpdated { intention },
                Ok(None) => OutboundEvent::error("Intention not found"),
                Err(err) => OutboundEvent::error(format!("Failed to update intention: {err}")),
            }
        }
        InboundAction::DeleteIntention { id } => {
            if intentions.delete(&id).await {
                OutboundEvent::IntentionDeleted { id }
            } else {
                OutboundEvent::error("Intention not found")
            }
        }
        InboundAction::ToggleIntention { id } => match intentions.toggle(&id).await {
            Some(intention) => OutboundEvent::IntentionToggled { intention },
            None => OutboundEvent::error("Intention not found"),
        },
        InboundAction::RunIntention { id } => match state.daemon.run_intention_now(&id).await {
            Ok(intention) => OutboundEvent::Notification {
                content: format!("Running intention: {}", intention.name),
            },
            Err(AppError::NotFound(_)) => OutboundEvent::error("Intention not found"),
            Err(AppError::AlreadyRunning(_)) => OutboundEvent::error("Intention is already running"),
            Err(err) => OutboundEvent::error(err.to_string()),
        },
        InboundAction::GetIntentions {} => OutboundEvent::Intentions {
            intentions: intentions.list(),
        },
        InboundAction::ToggleAgent { active } => {
            session.agent_active = active;
            info!(active, "agent mode changed");
            OutboundEvent::Notification {
                content: format!("Agent Mode: {}", if active { "ON" } else { "OFF" }),
            }
        }
        InboundAction::Chat { message } => {
            session.send(OutboundEvent::StreamStart {}).await;
            if session.agent_active {
                relay_run(state, session, &message).await;
            } else {
                let answer = match state.agent.chat(&message).await {
                    Ok(content) => OutboundEvent::Message { content },
                    Err(err) => {
                        warn!(%err, "chat request failed");
                        OutboundEvent::error(err.to_string())
                    }
                };
                session.send(answer).await;
            }
            OutboundEvent::StreamEnd {}
        }
    };

    session.send(event).await;
}

/// Relay one agent run to the session, stopping at the first failure.
async fn relay_run(state: &AppState, session: &SessionHandle, message: &str) {
    let mut chunks = state.agent.run(message);
    while let Some(item) = chunks.next().await {
        let event = match item {
            Ok(chunk) => OutboundEvent::AgentEvent { chunk },
            Err(err) => {
                warn!(%err, "agent run failed");
                session.send(OutboundEvent::error(err.to_string())).await;
                return;
            }
        };
        if !session.send(event).await {
            return;
        }
    }
}
