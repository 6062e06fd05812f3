//! Event Broadcaster
//!
//! Fan-out of each new decision to live observers. Strictly at-most-once,
//! best-effort, no backpressure: every observer owns a bounded outbound
//! queue; a full queue drops the event for that observer, a closed queue
//! removes the observer during the same publish pass.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use uuid::Uuid;

use crate::models::RequestRecord;
use crate::stats::ProxyStats;

/// Outbound queue depth per observer. Slow observers lose events past
/// this point instead of stalling publish.
const OBSERVER_QUEUE_DEPTH: usize = 64;

pub type ObserverId = Uuid;

/// Live observer registry plus the publish path.
pub struct Broadcaster {
    observers: Mutex<HashMap<ObserverId, Sender<String>>>,
    stats: Arc<ProxyStats>,
}

impl Broadcaster {
    pub fn new(stats: Arc<ProxyStats>) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            stats,
        }
    }

    /// Register a new observer; the returned receiver yields serialized
    /// events until the observer is dropped or unregistered.
    pub fn register(&self) -> (ObserverId, Receiver<String>) {
        let (tx, rx) = mpsc::channel(OBSERVER_QUEUE_DEPTH);
        let id = Uuid::new_v4();
        self.observers.lock().insert(id, tx);
        tracing::debug!(observer = %id, "observer registered");
        (id, rx)
    }

    /// Remove a deliberately-disconnected observer.
    pub fn unregister(&self, id: ObserverId) {
        if self.observers.lock().remove(&id).is_some() {
            tracing::debug!(observer = %id, "observer unregistered");
        }
    }

    /// Deliver one event to every registered observer, once each, no
    /// retry. Observers whose channel has closed are removed in this
    /// pass.
    pub fn publish(&self, record: &RequestRecord) {
        let event = json!({
            "event": "new_request",
            "data": record,
        })
        .to_string();

        let mut observers = self.observers.lock();
        observers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Queue full: drop this event, keep the observer.
                self.stats.broadcast_drops.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(observer = %id, "observer queue full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.broadcast_drops.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(observer = %id, "observer gone, removing");
                false
            }
        });
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}
