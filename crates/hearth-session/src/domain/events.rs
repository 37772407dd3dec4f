//! Domain events for the session context.

use hearth_core::action::ProposedAction;
use hearth_core::campaign::{Participant, TimelineEvent};
use hearth_core::error::DomainError;
use hearth_core::event::{DomainEvent, EventMetadata};
use hearth_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted when a session is opened for a campaign. Carries the roster and
/// timeline snapshot fetched from the campaign directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCreated {
    /// The session identifier.
    pub session_id: Uuid,
    /// The campaign being played.
    pub campaign_id: Uuid,
    /// Everyone allowed to join.
    pub roster: Vec<Participant>,
    /// Timeline events, ordered by position.
    pub timeline: Vec<TimelineEvent>,
}

/// Emitted when a roster participant joins the turn rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantJoined {
    /// The joining participant.
    pub participant_id: Uuid,
}

/// Emitted when a participant leaves the turn rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLeft {
    /// The leaving participant.
    pub participant_id: Uuid,
}

/// Emitted when a pending session becomes active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStarted {
    /// First turn-holder.
    pub first_participant_id: Uuid,
    /// Turn number after starting (always 1).
    pub turn_number: u32,
}

/// A change of turn-holder, computed when the event was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvance {
    /// Previous turn-holder.
    pub from_participant_id: Uuid,
    /// New turn-holder.
    pub to_participant_id: Uuid,
    /// Turn number after the advance.
    pub turn_number: u32,
    /// Disconnected humans passed over on the way.
    #[serde(default)]
    pub skipped: Vec<Uuid>,
}

/// Emitted when an action is admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAccepted {
    /// The proposing participant.
    pub proposer_id: Uuid,
    /// Client-supplied idempotency token.
    pub idempotency_token: String,
    /// The admitted action.
    pub action: ProposedAction,
    /// Whether the action ended the proposer's turn.
    pub turn_consuming: bool,
    /// Whether the action raised the explicit timeline flag.
    #[serde(default)]
    pub raises_timeline_flag: bool,
    /// The turn advance it caused, if any.
    pub advance: Option<TurnAdvance>,
}

/// Why a turn advanced without an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAdvanceReason {
    /// The turn-holder left the session.
    ParticipantLeft,
}

/// Emitted when the turn moves on for a reason other than an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvanced {
    /// The advance.
    pub advance: TurnAdvance,
    /// What caused it.
    pub reason: TurnAdvanceReason,
}

/// Emitted when a timeline event's trigger condition is met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineTriggered {
    /// The fired timeline event.
    pub timeline_event_id: Uuid,
    /// Its campaign position.
    pub position: u32,
    /// Timeline cursor after firing.
    pub cursor: usize,
    /// The timeline event's effect payload.
    pub effect: serde_json::Value,
}

/// Emitted when the session is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompleted {
    /// Free-form completion reason.
    pub reason: Option<String>,
}

/// Event type identifier for [`SessionCreated`].
pub const SESSION_CREATED_EVENT_TYPE: &str = "session.created";

/// Event type identifier for [`ParticipantJoined`].
pub const PARTICIPANT_JOINED_EVENT_TYPE: &str = "session.participant_joined";

/// Event type identifier for [`SessionStarted`].
pub const SESSION_STARTED_EVENT_TYPE: &str = "session.started";

/// Event type identifier for [`ActionAccepted`].
pub const ACTION_ACCEPTED_EVENT_TYPE: &str = "session.action_accepted";

/// Event type identifier for [`TurnAdvanced`].
pub const TURN_ADVANCED_EVENT_TYPE: &str = "session.turn_advanced";

/// Event type identifier for [`TimelineTriggered`].
pub const TIMELINE_TRIGGERED_EVENT_TYPE: &str = "session.timeline_triggered";

/// Event type identifier for [`ParticipantLeft`].
pub const PARTICIPANT_LEFT_EVENT_TYPE: &str = "session.participant_left";

/// Event type identifier for `SessionPaused`.
pub const SESSION_PAUSED_EVENT_TYPE: &str = "session.paused";

/// Event type identifier for `SessionResumed`.
pub const SESSION_RESUMED_EVENT_TYPE: &str = "session.resumed";

/// Event type identifier for [`SessionCompleted`].
pub const SESSION_COMPLETED_EVENT_TYPE: &str = "session.completed";

/// Event payload variants for the session context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// The session was opened.
    SessionCreated(SessionCreated),
    /// A participant joined.
    ParticipantJoined(ParticipantJoined),
    /// The session started.
    SessionStarted(SessionStarted),
    /// An action was admitted.
    ActionAccepted(ActionAccepted),
    /// The turn advanced without an action.
    TurnAdvanced(TurnAdvanced),
    /// A timeline event fired.
    TimelineTriggered(TimelineTriggered),
    /// A participant left.
    ParticipantLeft(ParticipantLeft),
    /// The session was paused.
    SessionPaused,
    /// The session was resumed.
    SessionResumed,
    /// The session was completed.
    SessionCompleted(SessionCompleted),
}

impl SessionEventKind {
    /// Returns the event type identifier for this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionCreated(_) => SESSION_CREATED_EVENT_TYPE,
            Self::ParticipantJoined(_) => PARTICIPANT_JOINED_EVENT_TYPE,
            Self::SessionStarted(_) => SESSION_STARTED_EVENT_TYPE,
            Self::ActionAccepted(_) => ACTION_ACCEPTED_EVENT_TYPE,
            Self::TurnAdvanced(_) => TURN_ADVANCED_EVENT_TYPE,
            Self::TimelineTriggered(_) => TIMELINE_TRIGGERED_EVENT_TYPE,
            Self::ParticipantLeft(_) => PARTICIPANT_LEFT_EVENT_TYPE,
            Self::SessionPaused => SESSION_PAUSED_EVENT_TYPE,
            Self::SessionResumed => SESSION_RESUMED_EVENT_TYPE,
            Self::SessionCompleted(_) => SESSION_COMPLETED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the session context.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: SessionEventKind,
}

impl SessionEvent {
    /// Rebuilds a session event from its stored form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload does not decode.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, DomainError> {
        let kind: SessionEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        Ok(Self {
            metadata: stored.metadata(),
            kind,
        })
    }

    /// Returns the stored form of this event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload does not encode.
    pub fn to_stored(&self) -> Result<StoredEvent, DomainError> {
        StoredEvent::from_domain(self)
    }

    /// Shorthand for the event's sequence number.
    #[must_use]
    pub fn sequence_number(&self) -> i64 {
        self.metadata.sequence_number
    }
}

impl DomainEvent for SessionEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(&self.kind)?)
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_test_support::fixed_time;

    #[test]
    fn test_stored_event_decodes_into_identical_session_event() {
        // Arrange
        let session_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let event = SessionEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: SESSION_COMPLETED_EVENT_TYPE.to_owned(),
                aggregate_id: session_id,
                sequence_number: 7,
                correlation_id,
                causation_id: correlation_id,
                occurred_at: fixed_time(),
            },
            kind: SessionEventKind::SessionCompleted(SessionCompleted {
                reason: Some("party wiped".to_owned()),
            }),
        };

        // Act
        let stored = event.to_stored().unwrap();
        let decoded = SessionEvent::from_stored(&stored).unwrap();

        // Assert
        assert_eq!(stored.event_type, "session.completed");
        assert_eq!(stored.sequence_number, 7);
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_from_stored_rejects_unknown_payload() {
        // Arrange
        let stored = StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: Uuid::new_v4(),
            event_type: "session.unknown".to_owned(),
            payload: serde_json::json!({ "dragon_summoned": {} }),
            sequence_number: 1,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: fixed_time(),
        };

        // Act
        let result = SessionEvent::from_stored(&stored);

        // Assert
        match result {
            Err(DomainError::Infrastructure(message)) => {
                assert!(message.contains("deserialization"));
            }
            other => panic!("expected Infrastructure error, got {other:?}"),
        }
    }
}
