//! Viewer connections and the fan-out registry.

use crate::auth::SharedSession;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use wcon_core::WireEvent;

/// Outbound queue depth per viewer. A viewer that falls this far behind
/// loses batches (logged) rather than stalling the producer.
const OUTBOUND_QUEUE: usize = 64;

/// One connected viewer.
pub struct ViewerHandle {
    /// Registry key.
    pub id: u64,
    /// Best-effort remote address, `"unknown"` when unresolvable.
    pub remote: String,
    /// Session attached by the auth subsystem, if any.
    pub session: Option<SharedSession>,
    tx: mpsc::Sender<WireEvent>,
}

impl ViewerHandle {
    /// Create a handle plus the receiver its session task drains.
    pub fn new(
        remote: String,
        session: Option<SharedSession>,
    ) -> (Self, mpsc::Receiver<WireEvent>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        (
            Self {
                id: generate_viewer_id(),
                remote,
                session,
                tx,
            },
            rx,
        )
    }

    /// Queue an event for this viewer. Returns false when the queue is full
    /// or the session task is gone; the payload is dropped either way.
    pub fn send(&self, event: WireEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Username from the attached session, or `"anonymous"`.
    pub async fn username(&self) -> String {
        match &self.session {
            Some(session) => {
                let guard = session.read().await;
                if guard.username.is_empty() {
                    "anonymous".to_string()
                } else {
                    guard.username.clone()
                }
            }
            None => "anonymous".to_string(),
        }
    }
}

/// Best-effort remote address label.
pub fn remote_label(addr: Option<SocketAddr>) -> String {
    match addr {
        Some(addr) => addr.to_string(),
        None => "unknown".to_string(),
    }
}

/// All currently connected viewers.
pub struct ViewerRegistry {
    viewers: RwLock<HashMap<u64, Arc<ViewerHandle>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add(&self, viewer: Arc<ViewerHandle>) {
        let mut viewers = self.viewers.write().await;
        viewers.insert(viewer.id, viewer);
    }

    pub async fn remove(&self, id: u64) {
        let mut viewers = self.viewers.write().await;
        viewers.remove(&id);
    }

    /// Fan an event out to every viewer. Slow viewers lose this event.
    pub async fn broadcast(&self, event: WireEvent) {
        let viewers = self.viewers.read().await;
        let mut recipients = 0u32;
        for viewer in viewers.values() {
            if viewer.send(event.clone()) {
                recipients += 1;
            } else {
                warn!(viewer = viewer.id, remote = %viewer.remote, "dropping batch for slow viewer");
            }
        }
        debug!(recipients, "broadcast console batch");
    }

    pub async fn count(&self) -> usize {
        self.viewers.read().await.len()
    }
}

impl Default for ViewerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random viewer ID.
fn generate_viewer_id() -> u64 {
    rand::random()
}
