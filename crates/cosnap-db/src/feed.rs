//! Change feed and snapshot subscriptions.
//!
//! Writers publish a [`Change`] after each committed mutation. A
//! [`Subscription`] listens to the feed, re-runs its query whenever a
//! relevant change arrives and hands the complete result to its callback.
//! Callbacks never see deltas.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Database;

const FEED_CAPACITY: usize = 1024;

/// A committed mutation, tagged with the keys subscribers filter on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    TimeSlot { id: String, photographer_id: String },
    BookingRequest { id: String, time_slot_id: String },
    Conversation { id: String, participants: [String; 2] },
    Message { conversation_id: String },
    Review { target_id: String },
}

impl Change {
    /// True when this change touches a conversation `user_id` takes part in.
    pub fn concerns_participant(&self, user_id: &str) -> bool {
        matches!(self, Self::Conversation { participants, .. } if participants.iter().any(|p| p == user_id))
    }

    /// True when this change adds or alters messages of `conversation_id`.
    pub fn concerns_messages_of(&self, conversation_id: &str) -> bool {
        matches!(self, Self::Message { conversation_id: id } if id == conversation_id)
    }
}

#[derive(Clone)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    pub fn publish(&self, change: Change) {
        // No receivers is the common case outside the gateway
        let _ = self.tx.send(change);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a live snapshot listener. Dropping it (or calling
/// [`Subscription::unsubscribe`]) stops the listener and releases its callback.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Database {
    /// Deliver `query`'s result to `on_snapshot` now and again after every
    /// change for which `relevant` returns true.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch<T, Q, R, C>(self: &Arc<Self>, relevant: R, query: Q, mut on_snapshot: C) -> Subscription
    where
        T: Send + 'static,
        Q: Fn(&Database) -> anyhow::Result<T> + Send + Sync + 'static,
        R: Fn(&Change) -> bool + Send + 'static,
        C: FnMut(T) + Send + 'static,
    {
        // Subscribe before the first snapshot so nothing committed in between is lost
        let mut rx = self.feed.subscribe();
        let db = self.clone();
        let query = Arc::new(query);

        let task = tokio::spawn(async move {
            let mut stale = true;
            loop {
                if stale {
                    let db = db.clone();
                    let query = query.clone();
                    match tokio::task::spawn_blocking(move || query(&db)).await {
                        Ok(Ok(snapshot)) => on_snapshot(snapshot),
                        Ok(Err(e)) => warn!("Snapshot query failed: {}", e),
                        Err(e) => warn!("spawn_blocking join error: {}", e),
                    }
                }

                stale = match rx.recv().await {
                    Ok(change) => relevant(&change),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Change feed receiver lagged by {} changes", n);
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
            }
            debug!("Snapshot listener finished");
        });

        Subscription { task }
    }
}
