//! In-memory registry of live sessions.
//!
//! Every session has one slot with its own lock; holding the lock is what
//! serializes the session's commands. State is recovered lazily from the
//! event log the first time a session is touched after a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use hearth_core::error::DomainError;
use hearth_core::repository::EventRepository;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::domain::aggregates::Session;
use crate::domain::events::SessionEvent;

/// Mutable per-session data guarded by the slot lock.
#[derive(Debug)]
pub(crate) struct SessionCore {
    pub(crate) session: Session,
    /// Live subscription count per participant. Transient; never persisted.
    pub(crate) connected: HashMap<Uuid, usize>,
    /// Most recent committed events, oldest first.
    pub(crate) recent: VecDeque<SessionEvent>,
    recent_limit: usize,
    /// Set when the slot was rebuilt from the log and no command has run yet.
    pub(crate) recovered: bool,
    /// Set while an append is unconfirmed. A command abandoned mid-append
    /// leaves it set, and the session is caught up from the log before it
    /// is used again.
    pub(crate) in_doubt: bool,
}

impl SessionCore {
    pub(crate) fn new(session: Session, recent_limit: usize) -> Self {
        Self {
            session,
            connected: HashMap::new(),
            recent: VecDeque::with_capacity(recent_limit),
            recent_limit,
            recovered: false,
            in_doubt: false,
        }
    }

    pub(crate) fn remember(&mut self, event: SessionEvent) {
        if self.recent_limit == 0 {
            return;
        }
        while self.recent.len() >= self.recent_limit {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    pub(crate) fn connect(&mut self, participant_id: Uuid) {
        *self.connected.entry(participant_id).or_default() += 1;
    }

    pub(crate) fn disconnect(&mut self, participant_id: Uuid) {
        if let Some(count) = self.connected.get_mut(&participant_id) {
            *count -= 1;
            if *count == 0 {
                self.connected.remove(&participant_id);
            }
        }
    }
}

/// A live session and its lock.
#[derive(Debug)]
pub(crate) struct SessionSlot {
    pub(crate) id: Uuid,
    pub(crate) core: Mutex<SessionCore>,
}

/// Live sessions by id.
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    slots: RwLock<HashMap<Uuid, Arc<SessionSlot>>>,
    recent_limit: usize,
}

impl SessionRegistry {
    pub(crate) fn new(recent_limit: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            recent_limit,
        }
    }

    /// Registers a freshly created session, replacing nothing.
    pub(crate) async fn insert(&self, core: SessionCore) -> Arc<SessionSlot> {
        let id = core.session.id;
        let slot = Arc::new(SessionSlot {
            id,
            core: Mutex::new(core),
        });
        self.slots
            .write()
            .await
            .entry(id)
            .or_insert(slot)
            .clone()
    }

    /// Wraps a session in a core sized for this registry.
    pub(crate) fn core_for(&self, session: Session) -> SessionCore {
        SessionCore::new(session, self.recent_limit)
    }

    /// Returns the live slot, rebuilding it from the log if needed.
    pub(crate) async fn get_or_load(
        &self,
        session_id: Uuid,
        repository: &dyn EventRepository,
    ) -> Result<Arc<SessionSlot>, DomainError> {
        if let Some(slot) = self.slots.read().await.get(&session_id) {
            return Ok(Arc::clone(slot));
        }

        let stored_events = repository.load_events(session_id).await?;
        if stored_events.is_empty() {
            return Err(DomainError::AggregateNotFound(session_id));
        }
        let session = Session::reconstitute(session_id, &stored_events)?;
        let mut core = self.core_for(session);
        let tail = stored_events.len().saturating_sub(self.recent_limit);
        for stored in &stored_events[tail..] {
            core.remember(SessionEvent::from_stored(stored)?);
        }
        core.recovered = true;
        info!(
            %session_id,
            events = stored_events.len(),
            "recovered session from event log"
        );
        Ok(self.insert(core).await)
    }

    /// Drops a slot; the next access reloads it from the log.
    pub(crate) async fn evict(&self, session_id: Uuid) {
        self.slots.write().await.remove(&session_id);
    }

    /// Returns the live slot without loading.
    pub(crate) async fn get(&self, session_id: Uuid) -> Option<Arc<SessionSlot>> {
        self.slots.read().await.get(&session_id).cloned()
    }

    pub(crate) async fn contains(&self, session_id: Uuid) -> bool {
        self.slots.read().await.contains_key(&session_id)
    }
}
