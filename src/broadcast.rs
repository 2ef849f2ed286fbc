//! Status broadcaster
//!
//! Fan-out of human-readable status lines to every attached observer. Each
//! observer owns one unbounded channel, so a slow or departed observer
//! never holds up the others. Late joiners see only lines sent after they
//! subscribe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiving end of one observer.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<String>,
}

impl Subscription {
    /// Observer id, for [`StatusBroadcaster::unsubscribe`].
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Next line, or `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// A line if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

/// Observer registry.
///
/// Registration and broadcast may run concurrently from any task.
#[derive(Debug, Default)]
pub struct StatusBroadcaster {
    observers: Mutex<HashMap<u64, UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl StatusBroadcaster {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new observer.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::unbounded_channel();
        self.observers.lock().insert(id, tx);
        tracing::debug!(observer = id, "observer attached");
        Subscription { id, receiver }
    }

    /// Detach an observer. Returns whether it was attached.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.observers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer = id, "observer detached");
        }
        removed
    }

    /// Number of attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Send `line` to every observer; returns how many received it.
    ///
    /// Observers whose receiving end is gone are dropped from the registry.
    pub fn broadcast(&self, line: impl Into<String>) -> usize {
        let line = line.into();
        let snapshot: Vec<(u64, UnboundedSender<String>)> = self
            .observers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(line.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut observers = self.observers.lock();
            for id in &closed {
                observers.remove(id);
            }
            tracing::warn!(dropped = closed.len(), "dropped closed observers");
        }
        tracing::debug!(delivered, line = %line, "status broadcast");
        delivered
    }
}
