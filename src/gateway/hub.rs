//! Fan-out of outbound events to every connected session.
//!
//! Each session registers a bounded queue. `broadcast` never awaits: it
//! works on a point-in-time snapshot of the registry, uses `try_send`, and
//! evicts any connection whose queue is full or closed. Evicted sessions
//! are told to shut down through their cancellation token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::event::OutboundEvent;

/// Opaque per-connection handle.
pub type ConnectionId = u64;

/// What a session receives when it registers.
#[derive(Debug)]
pub struct Registration {
    /// Handle used to unregister.
    pub id: ConnectionId,
    /// Cancelled when the hub gives up on this connection.
    pub evicted: CancellationToken,
}

struct Connection {
    tx: mpsc::Sender<OutboundEvent>,
    evicted: CancellationToken,
}

/// Registry of live connections.
#[derive(Default)]
pub struct BroadcastHub {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    /// Empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection's outbound queue to the registry.
    pub fn register(&self, tx: mpsc::Sender<OutboundEvent>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let evicted = CancellationToken::new();
        self.lock().insert(
            id,
            Connection {
                tx,
                evicted: evicted.clone(),
            },
        );
        debug!(connection_id = id, "connection registered");
        Registration { id, evicted }
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(connection_id = id, "connection unregistered");
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `event` to every connection registered at call time.
    ///
    /// Returns how many connections accepted it. Connections that fail are
    /// unregistered and signalled; the failure is not propagated.
    pub fn broadcast(&self, event: &OutboundEvent) -> usize {
        let snapshot: Vec<(ConnectionId, mpsc::Sender<OutboundEvent>)> = self
            .lock()
            .iter()
            .map(|(id, conn)| (*id, conn.tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = id, "outbound queue full; dropping connection");
                    failed.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = id, "outbound queue closed; dropping connection");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut connections = self.lock();
            for id in failed {
                if let Some(conn) = connections.remove(&id) {
                    conn.evicted.cancel();
                }
            }
        }
        delivered
    }
}

/// Spawn the task that drains background-loop events into the hub.
///
/// Runs until `cancel` fires or every sender is dropped.
#[must_use]
pub fn spawn_event_pump(
    hub: Arc<BroadcastHub>,
    mut rx: mpsc::UnboundedReceiver<OutboundEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("event pump shutting down");
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(event) = maybe_event { event } else {
                        info!("event channel closed");
                        break;
                    }
                }
            };

            let delivered = hub.broadcast(&event);
            debug!(delivered, "event broadcast");
        }
    })
}
