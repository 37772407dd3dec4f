//! Event envelope shared by every stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Envelope fields carried by each event in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Identity of this event.
    pub event_id: Uuid,
    /// Dotted name such as `session.started`; selects the payload decoder.
    pub event_type: String,
    /// The stream the event was appended to.
    pub aggregate_id: Uuid,
    /// Position in the stream. Starts at 1 and has no gaps.
    pub sequence_number: i64,
    /// Shared by all events written for one command.
    pub correlation_id: Uuid,
    /// The command or event that led to this one.
    pub causation_id: Uuid,
    /// Clock reading when the event was raised.
    pub occurred_at: DateTime<Utc>,
}

/// An event that can be written to an event stream.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Dotted event name stored beside the payload.
    fn event_type(&self) -> &'static str;

    /// Encodes the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// The event's envelope.
    fn metadata(&self) -> &EventMetadata;
}
