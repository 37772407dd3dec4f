//! Query handlers and read-only views for the session context.
//!
//! Views are built from the fold of the event log, so a view taken from the
//! live state and one rebuilt from storage are always equal.

use chrono::{DateTime, Utc};
use hearth_core::campaign::Participant;
use hearth_core::error::DomainError;
use hearth_core::repository::EventRepository;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::Session;
use crate::domain::events::{SessionEvent, SessionEventKind};
use crate::domain::state::{SessionState, SessionStatus};

/// Read-only snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    /// The session identifier.
    pub session_id: Uuid,
    /// The campaign being played.
    pub campaign_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Campaign roster snapshot.
    pub roster: Vec<Participant>,
    /// Turn rotation, in order.
    pub participants: Vec<Uuid>,
    /// Current turn-holder.
    pub active_participant_id: Option<Uuid>,
    /// Rotation count.
    pub turn_number: u32,
    /// Turn-consuming actions admitted so far.
    pub turns_taken: u64,
    /// Index of the next timeline event to fire.
    pub timeline_cursor: usize,
    /// Length of the campaign timeline.
    pub timeline_len: usize,
    /// Whether the explicit timeline flag is raised.
    pub timeline_flag: bool,
    /// Sequence number of the last event folded into this view.
    pub last_sequence_number: i64,
}

impl SessionView {
    /// Builds the view of a folded state.
    #[must_use]
    pub fn from_state(session_id: Uuid, state: &SessionState) -> Self {
        Self {
            session_id,
            campaign_id: state.campaign_id,
            status: state.status,
            roster: state.roster.clone(),
            participants: state.participants.clone(),
            active_participant_id: state.active_participant,
            turn_number: state.turn_number,
            turns_taken: state.turns_taken,
            timeline_cursor: state.timeline_cursor,
            timeline_len: state.timeline.len(),
            timeline_flag: state.timeline_flag,
            last_sequence_number: state.last_sequence_number,
        }
    }
}

/// Wire form of a committed session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEventView {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Position in the session's log.
    pub sequence_number: i64,
    /// Event type identifier.
    pub event_type: String,
    /// When the event was decided.
    pub occurred_at: DateTime<Utc>,
    /// Event payload.
    pub kind: SessionEventKind,
}

impl From<&SessionEvent> for SessionEventView {
    fn from(event: &SessionEvent) -> Self {
        Self {
            event_id: event.metadata.event_id,
            sequence_number: event.metadata.sequence_number,
            event_type: event.metadata.event_type.clone(),
            occurred_at: event.metadata.occurred_at,
            kind: event.kind.clone(),
        }
    }
}

/// Retrieves a session by replaying its event log.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if the log fails to load or decode.
pub async fn get_session_by_id(
    session_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<SessionView, DomainError> {
    let stored_events = repo.load_events(session_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(session_id));
    }
    let session = Session::reconstitute(session_id, &stored_events)?;
    Ok(SessionView::from_state(session_id, session.state()))
}
