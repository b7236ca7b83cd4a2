//! Drives one intention's prompt through the agent and relays its output.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::ChatAgent;
use crate::models::event::{ExecutionChunk, OutboundEvent};
use crate::models::intention::Intention;

/// Outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Agent chunks relayed between the boundary markers.
    pub chunks: usize,
    /// Whether the agent failed partway.
    pub failed: bool,
}

/// Relays agent output as `intention_event`s on the event channel.
///
/// Every execution is framed by a `start` chunk and an unconditional
/// `end` chunk, so listeners can separate interleaved runs.
#[derive(Clone)]
pub struct ExecutionRunner {
    agent: Arc<dyn ChatAgent>,
    events: mpsc::UnboundedSender<OutboundEvent>,
}

impl ExecutionRunner {
    /// Create a runner publishing on `events`.
    #[must_use]
    pub fn new(agent: Arc<dyn ChatAgent>, events: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { agent, events }
    }

    /// Run `intention` to completion or failure.
    pub async fn run(&self, intention: &Intention) -> RunSummary {
        self.emit(&intention.id, ExecutionChunk::start(&intention.name));

        let relay = self.relay(intention);
        let summary = match AssertUnwindSafe(relay).catch_unwind().await {
            Ok(summary) => summary,
            Err(panic) => {
                warn!(intention_id = %intention.id, ?panic, "agent panicked during execution");
                self.emit(&intention.id, ExecutionChunk::error("execution aborted unexpectedly"));
                RunSummary {
                    chunks: 0,
                    failed: true,
                }
            }
        };

        self.emit(&intention.id, ExecutionChunk::end());
        info!(
            intention_id = %intention.id,
            chunks = summary.chunks,
            failed = summary.failed,
            "intention execution finished"
        );
        summary
    }

    async fn relay(&self, intention: &Intention) -> RunSummary {
        let mut stream = self.agent.run(&intention.prompt);
        let mut chunks = 0;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    chunks += 1;
                    self.emit(&intention.id, chunk);
                }
                Err(err) => {
                    warn!(intention_id = %intention.id, %err, "agent failed mid-run");
                    self.emit(&intention.id, ExecutionChunk::error(err.to_string()));
                    return RunSummary {
                        chunks,
                        failed: true,
                    };
                }
            }
        }

        RunSummary {
            chunks,
            failed: false,
        }
    }

    fn emit(&self, intention_id: &str, chunk: ExecutionChunk) {
        let event = OutboundEvent::IntentionEvent {
            intention_id: intention_id.to_owned(),
            chunk,
        };
        if self.events.send(event).is_err() {
            debug!(intention_id, "event channel closed; chunk dropped");
        }
    }
}
