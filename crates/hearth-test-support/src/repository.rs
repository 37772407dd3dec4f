//! In-memory, stalling and failing `EventRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::error::DomainError;
use hearth_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An in-memory event store with the same optimistic-concurrency contract
/// as the PostgreSQL repository. Also records every append call.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-seeded with one stream.
    #[must_use]
    pub fn with_stream(aggregate_id: Uuid, events: Vec<StoredEvent>) -> Self {
        let repo = Self::new();
        repo.streams.lock().unwrap().insert(aggregate_id, events);
        repo
    }

    /// Returns a snapshot of all append calls as
    /// `(aggregate_id, expected_version, events)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns every event currently stored for a stream.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream(aggregate_id))
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// Wraps an [`InMemoryEventRepository`] and holds one append call, the
/// `nth` counting from 1, for `stall`. Use with a timeout to abandon a
/// command while its append is pending.
#[derive(Debug)]
pub struct StallingEventRepository {
    inner: InMemoryEventRepository,
    nth: usize,
    stall: Duration,
    lands_first: bool,
    appends: AtomicUsize,
}

impl StallingEventRepository {
    /// Stalls the `nth` append before anything is written.
    #[must_use]
    pub fn before_write(nth: usize, stall: Duration) -> Self {
        Self {
            inner: InMemoryEventRepository::new(),
            nth,
            stall,
            lands_first: false,
            appends: AtomicUsize::new(0),
        }
    }

    /// Writes the `nth` append, then stalls before reporting success.
    #[must_use]
    pub fn after_write(nth: usize, stall: Duration) -> Self {
        Self {
            lands_first: true,
            ..Self::before_write(nth, stall)
        }
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryEventRepository {
        &self.inner
    }
}

#[async_trait]
impl EventRepository for StallingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner.load_events(aggregate_id).await
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let stalls = self.appends.fetch_add(1, Ordering::SeqCst) + 1 == self.nth;
        if stalls && !self.lands_first {
            tokio::time::sleep(self.stall).await;
        }
        let result = self
            .inner
            .append_events(aggregate_id, expected_version, events)
            .await;
        if stalls && self.lands_first {
            tokio::time::sleep(self.stall).await;
        }
        result
    }
}
