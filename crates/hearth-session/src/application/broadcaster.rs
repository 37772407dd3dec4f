//! Fan-out of committed session events to subscribers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a subscriber
//! whose queue is full receives one `ResyncRequired` marker and is dropped,
//! and must resubscribe for a fresh snapshot. Publishing happens while the
//! session is locked, so every subscriber sees deltas in sequence order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::query_handlers::{SessionEventView, SessionView};
use crate::domain::events::SessionEvent;

/// An update delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Full state; always the first update on a subscription.
    Snapshot {
        /// The session view.
        view: SessionView,
    },
    /// One committed event.
    Delta {
        /// The event.
        event: SessionEventView,
    },
    /// The subscriber fell behind and was dropped.
    ResyncRequired {
        /// Last sequence number enqueued before the drop.
        last_sequence_number: i64,
    },
}

/// What one publish did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Subscribers that received the event.
    pub delivered: usize,
    /// Participants whose subscription was dropped during the publish, one
    /// entry per dropped subscription.
    pub released: Vec<Uuid>,
}

struct Subscriber {
    participant_id: Option<Uuid>,
    tx: mpsc::Sender<SessionUpdate>,
    last_enqueued: i64,
}

struct Inner {
    capacity: usize,
    sessions: Mutex<HashMap<Uuid, HashMap<Uuid, Subscriber>>>,
}

/// Per-session subscriber registry.
#[derive(Clone)]
pub struct SessionBroadcaster {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBroadcaster")
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}

impl SessionBroadcaster {
    /// Creates a broadcaster whose subscribers may queue `capacity` updates.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, HashMap<Uuid, Subscriber>>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a subscriber and enqueues its snapshot.
    ///
    /// The caller must hold the session lock so no delta is published
    /// between taking the snapshot and registering.
    #[must_use]
    pub fn subscribe(
        &self,
        session_id: Uuid,
        participant_id: Option<Uuid>,
        snapshot: SessionView,
    ) -> Subscription {
        // One slot beyond capacity is kept for the resync marker.
        let (tx, rx) = mpsc::channel(self.inner.capacity + 1);
        let id = Uuid::new_v4();
        let watermark = snapshot.last_sequence_number;
        // The channel is fresh, so the snapshot always fits.
        let _ = tx.try_send(SessionUpdate::Snapshot { view: snapshot });
        self.sessions().entry(session_id).or_default().insert(
            id,
            Subscriber {
                participant_id,
                tx,
                last_enqueued: watermark,
            },
        );
        debug!(%session_id, subscription_id = %id, "subscriber registered");
        Subscription {
            id,
            session_id,
            participant_id,
            rx,
            watermark,
        }
    }

    /// Removes a subscriber. Returns `true` if it was still registered.
    pub fn unsubscribe(&self, session_id: Uuid, subscription_id: Uuid) -> bool {
        let mut sessions = self.sessions();
        let Some(subscribers) = sessions.get_mut(&session_id) else {
            return false;
        };
        let removed = subscribers.remove(&subscription_id).is_some();
        if subscribers.is_empty() {
            sessions.remove(&session_id);
        }
        removed
    }

    /// Enqueues a committed event for every subscriber of its session.
    pub fn publish(&self, event: &SessionEvent) -> Fanout {
        let session_id = event.metadata.aggregate_id;
        let view = SessionEventView::from(event);
        let mut sessions = self.sessions();
        let Some(subscribers) = sessions.get_mut(&session_id) else {
            return Fanout::default();
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for (id, subscriber) in subscribers.iter_mut() {
            if subscriber.tx.is_closed() {
                dropped.push(*id);
                continue;
            }
            if subscriber.tx.capacity() <= 1 {
                warn!(
                    %session_id,
                    subscription_id = %id,
                    participant_id = ?subscriber.participant_id,
                    last_sequence_number = subscriber.last_enqueued,
                    "subscriber queue full, requesting resync"
                );
                let _ = subscriber.tx.try_send(SessionUpdate::ResyncRequired {
                    last_sequence_number: subscriber.last_enqueued,
                });
                dropped.push(*id);
                continue;
            }
            if subscriber
                .tx
                .try_send(SessionUpdate::Delta {
                    event: view.clone(),
                })
                .is_ok()
            {
                subscriber.last_enqueued = view.sequence_number;
                delivered += 1;
            } else {
                dropped.push(*id);
            }
        }
        let released = dropped
            .iter()
            .filter_map(|id| subscribers.remove(id))
            .filter_map(|subscriber| subscriber.participant_id)
            .collect();
        if subscribers.is_empty() {
            sessions.remove(&session_id);
        }

        debug!(
            %session_id,
            sequence_number = view.sequence_number,
            event_type = %view.event_type,
            delivered,
            dropped = dropped.len(),
            "published session event"
        );
        Fanout {
            delivered,
            released,
        }
    }

    /// Removes subscribers whose receiving end was dropped without an
    /// unsubscribe, returning the participant of each.
    pub fn prune_closed(&self, session_id: Uuid) -> Vec<Uuid> {
        let mut sessions = self.sessions();
        let Some(subscribers) = sessions.get_mut(&session_id) else {
            return Vec::new();
        };
        let mut released = Vec::new();
        subscribers.retain(|id, subscriber| {
            if !subscriber.tx.is_closed() {
                return true;
            }
            debug!(%session_id, subscription_id = %id, "pruned abandoned subscriber");
            released.extend(subscriber.participant_id);
            false
        });
        if subscribers.is_empty() {
            sessions.remove(&session_id);
        }
        released
    }

    /// Drops every subscriber of a session, closing their streams.
    pub fn close(&self, session_id: Uuid) {
        if let Some(subscribers) = self.sessions().remove(&session_id) {
            debug!(%session_id, closed = subscribers.len(), "closed session subscribers");
        }
    }

    /// Number of subscribers currently registered for a session.
    #[must_use]
    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.sessions().get(&session_id).map_or(0, HashMap::len)
    }
}

/// A subscriber's end of a session stream.
#[derive(Debug)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: Uuid,
    /// The session subscribed to.
    pub session_id: Uuid,
    /// The participant behind the subscription, if any.
    pub participant_id: Option<Uuid>,
    rx: mpsc::Receiver<SessionUpdate>,
    watermark: i64,
}

impl Subscription {
    /// Waits for the next update. Returns `None` once the stream is closed.
    ///
    /// Deltas at or below the last seen sequence number are skipped.
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        loop {
            let update = self.rx.recv().await?;
            match &update {
                SessionUpdate::Delta { event } if event.sequence_number <= self.watermark => {}
                SessionUpdate::Delta { event } => {
                    self.watermark = event.sequence_number;
                    return Some(update);
                }
                SessionUpdate::Snapshot { view } => {
                    self.watermark = view.last_sequence_number;
                    return Some(update);
                }
                SessionUpdate::ResyncRequired { .. } => return Some(update),
            }
        }
    }

    /// Returns an already-queued update without waiting.
    pub fn try_recv(&mut self) -> Option<SessionUpdate> {
        loop {
            let update = self.rx.try_recv().ok()?;
            match &update {
                SessionUpdate::Delta { event } if event.sequence_number <= self.watermark => {}
                SessionUpdate::Delta { event } => {
                    self.watermark = event.sequence_number;
                    return Some(update);
                }
                SessionUpdate::Snapshot { view } => {
                    self.watermark = view.last_sequence_number;
                    return Some(update);
                }
                SessionUpdate::ResyncRequired { .. } => return Some(update),
            }
        }
    }

    /// Sequence number of the last update handed out.
    #[must_use]
    pub fn watermark(&self) -> i64 {
        self.watermark
    }
}
