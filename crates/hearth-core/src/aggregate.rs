//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// An event-sourced aggregate: state is the fold of its event stream.
///
/// Command methods stage events as uncommitted; once the stream append
/// succeeds the caller invokes [`AggregateRoot::commit`] to fold them in.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Folds one event into the aggregate state. Must be pure.
    fn apply(&mut self, event: &Self::Event);

    /// Returns events staged by command handling that are not yet persisted.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Removes and returns the staged events without applying them.
    fn take_uncommitted_events(&mut self) -> Vec<Self::Event>;

    /// Applies every staged event in order and returns them.
    ///
    /// Call only after the events have been durably appended.
    fn commit(&mut self) -> Vec<Self::Event> {
        let events = self.take_uncommitted_events();
        for event in &events {
            self.apply(event);
        }
        events
    }
}
