//! Unauthorized notification channel
//!
//! Process-wide publish point the gateway fires when the device rejects the
//! current credential. Delivery is synchronous and has no replay: a handler
//! registered after a broadcast never sees it, and every broadcast reaches
//! every current handler exactly once.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

/// Payload-less signal: the session is no longer valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

/// Handle returned by [`UnauthorizedChannel::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Subscribers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

pub struct UnauthorizedChannel {
    subscribers: Mutex<Subscribers>,
    event_tx: broadcast::Sender<Unauthorized>,
}

impl Default for UnauthorizedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl UnauthorizedChannel {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            subscribers: Mutex::new(Subscribers {
                next_id: 0,
                handlers: Vec::new(),
            }),
            event_tx,
        }
    }

    /// Register a handler invoked on every future notification
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    ///
    /// Takes effect immediately, also for a broadcast already in progress.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.lock();
        let before = subs.handlers.len();
        subs.handlers.retain(|(sid, _)| *sid != id);
        subs.handlers.len() != before
    }

    /// Async receiver for notifications sent after this call
    pub fn listen(&self) -> broadcast::Receiver<Unauthorized> {
        self.event_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Broadcast to all current subscribers
    pub fn notify(&self) {
        // Snapshot first so handlers may (un)subscribe while being called
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .lock()
            .handlers
            .iter()
            .map(|(id, h)| (*id, Arc::clone(h)))
            .collect();

        tracing::debug!("Broadcasting unauthorized to {} handler(s)", handlers.len());
        for (id, handler) in handlers {
            if self.is_subscribed(id) {
                handler();
            }
        }

        // No receivers is fine
        let _ = self.event_tx.send(Unauthorized);
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().handlers.iter().any(|(sid, _)| *sid == id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for UnauthorizedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnauthorizedChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
