//! Aggregate root for a live session.

use hearth_core::action::ProposedAction;
use hearth_core::aggregate::AggregateRoot;
use hearth_core::campaign::{Participant, TimelineEvent};
use hearth_core::clock::Clock;
use hearth_core::error::DomainError;
use hearth_core::event::EventMetadata;
use hearth_core::repository::StoredEvent;
use uuid::Uuid;

use super::events::{
    ActionAccepted, ParticipantJoined, ParticipantLeft, SessionCompleted, SessionCreated,
    SessionEvent, SessionEventKind, SessionStarted, TimelineTriggered, TurnAdvanceReason,
    TurnAdvanced,
};
use super::intent::ActionIntent;
use super::outcome::RejectionReason;
use super::state::{Presence, SessionState, SessionStatus};

/// Completion reason recorded when the rotation empties.
pub const ALL_PARTICIPANTS_LEFT: &str = "all participants left";

/// The aggregate root for a session.
///
/// Command methods validate against the projected state (committed state
/// plus anything already staged), then stage events. Several commands may be
/// staged before a single append.
#[derive(Debug)]
pub struct Session {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// State folded from committed events.
    state: SessionState,
    /// State after the staged events, while any are staged.
    projected: Option<SessionState>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<SessionEvent>,
}

impl Session {
    /// Creates an empty session stream.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            state: SessionState::default(),
            projected: None,
            uncommitted_events: Vec::new(),
        }
    }

    /// Rebuilds a session by folding its stored events from sequence 1.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event does not decode or
    /// the stream has a gap.
    pub fn reconstitute(id: Uuid, stored_events: &[StoredEvent]) -> Result<Self, DomainError> {
        let mut session = Self::new(id);
        for stored in stored_events {
            let expected = session.version + 1;
            if stored.sequence_number != expected {
                return Err(DomainError::Infrastructure(format!(
                    "session {id} stream is not gap-free: expected sequence {expected}, found {}",
                    stored.sequence_number
                )));
            }
            let event = SessionEvent::from_stored(stored)?;
            session.apply(&event);
        }
        Ok(session)
    }

    /// The committed state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The state as it will be once staged events are committed.
    #[must_use]
    pub fn projected(&self) -> &SessionState {
        self.projected.as_ref().unwrap_or(&self.state)
    }

    /// Returns the next sequence number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn raise(&mut self, kind: SessionEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = SessionEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.event_type().to_owned(),
                aggregate_id: self.id,
                sequence_number: self.next_sequence_number(),
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        let mut projected = self.projected.take().unwrap_or_else(|| self.state.clone());
        projected.apply(&event);
        self.projected = Some(projected);
        self.uncommitted_events.push(event);
    }

    /// Stages a `TimelineTriggered` event for every due timeline entry.
    fn trigger_due_timeline(&mut self, correlation_id: Uuid, clock: &dyn Clock) {
        while let Some(next) = self.projected().due_timeline_event().cloned() {
            let cursor = self.projected().timeline_cursor + 1;
            self.raise(
                SessionEventKind::TimelineTriggered(TimelineTriggered {
                    timeline_event_id: next.id,
                    position: next.position,
                    cursor,
                    effect: next.effect,
                }),
                correlation_id,
                clock,
            );
        }
    }

    /// Opens the session with the campaign's roster and timeline.
    ///
    /// # Errors
    ///
    /// Returns `RejectionReason::AlreadyStarted` if the stream already exists.
    pub fn open(
        &mut self,
        campaign_id: Uuid,
        roster: Vec<Participant>,
        mut timeline: Vec<TimelineEvent>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), RejectionReason> {
        if self.projected().is_created() {
            return Err(RejectionReason::AlreadyStarted);
        }
        timeline.sort_by_key(|t| t.position);
        self.raise(
            SessionEventKind::SessionCreated(SessionCreated {
                session_id: self.id,
                campaign_id,
                roster,
                timeline,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Adds a roster participant to the end of the rotation.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the session is paused or completed, the
    /// participant is not on the roster, or has already joined.
    pub fn join(
        &mut self,
        participant_id: Uuid,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), RejectionReason> {
        let state = self.projected();
        match state.status {
            SessionStatus::Completed => return Err(RejectionReason::SessionClosed),
            SessionStatus::Paused => return Err(RejectionReason::SessionNotActive),
            SessionStatus::Pending | SessionStatus::Active => {}
        }
        if state.roster_entry(participant_id).is_none() {
            return Err(RejectionReason::UnknownParticipant);
        }
        if state.has_joined(participant_id) {
            return Err(RejectionReason::AlreadyJoined);
        }
        self.raise(
            SessionEventKind::ParticipantJoined(ParticipantJoined { participant_id }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Starts a pending session; the first participant in the rotation
    /// takes turn 1.
    ///
    /// # Errors
    ///
    /// Returns a rejection unless the session is pending with at least one
    /// participant.
    pub fn begin(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), RejectionReason> {
        let state = self.projected();
        match state.status {
            SessionStatus::Completed => return Err(RejectionReason::SessionClosed),
            SessionStatus::Active | SessionStatus::Paused => {
                return Err(RejectionReason::AlreadyStarted);
            }
            SessionStatus::Pending => {}
        }
        let Some(first_participant_id) = state.participants.first().copied() else {
            return Err(RejectionReason::NoParticipants);
        };
        self.raise(
            SessionEventKind::SessionStarted(SessionStarted {
                first_participant_id,
                turn_number: 1,
            }),
            correlation_id,
            clock,
        );
        self.trigger_due_timeline(correlation_id, clock);
        Ok(())
    }

    /// Stages an already-validated action, the turn advance it causes, and
    /// any timeline events that become due.
    #[allow(clippy::too_many_arguments)]
    pub fn accept_action(
        &mut self,
        proposer_id: Uuid,
        idempotency_token: String,
        action: ProposedAction,
        intent: &ActionIntent,
        presence: &dyn Presence,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) {
        let turn_consuming = intent.is_turn_consuming();
        let advance = if turn_consuming {
            self.projected().plan_advance(presence, None)
        } else {
            None
        };
        let advanced = advance.is_some();
        self.raise(
            SessionEventKind::ActionAccepted(ActionAccepted {
                proposer_id,
                idempotency_token,
                action,
                turn_consuming,
                raises_timeline_flag: intent.raises_timeline_flag(),
                advance,
            }),
            correlation_id,
            clock,
        );
        if advanced {
            self.trigger_due_timeline(correlation_id, clock);
        }
    }

    /// Pauses an active session.
    ///
    /// # Errors
    ///
    /// Returns a rejection unless the session is active.
    pub fn pause(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), RejectionReason> {
        match self.projected().status {
            SessionStatus::Completed => Err(RejectionReason::SessionClosed),
            SessionStatus::Pending | SessionStatus::Paused => Err(RejectionReason::SessionNotActive),
            SessionStatus::Active => {
                self.raise(SessionEventKind::SessionPaused, correlation_id, clock);
                Ok(())
            }
        }
    }

    /// Resumes a paused session.
    ///
    /// # Errors
    ///
    /// Returns a rejection unless the session is paused.
    pub fn resume(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), RejectionReason> {
        match self.projected().status {
            SessionStatus::Completed => Err(RejectionReason::SessionClosed),
            SessionStatus::Pending | SessionStatus::Active => {
                Err(RejectionReason::SessionNotPaused)
            }
            SessionStatus::Paused => {
                self.raise(SessionEventKind::SessionResumed, correlation_id, clock);
                Ok(())
            }
        }
    }

    /// Completes the session from any non-terminal status.
    ///
    /// # Errors
    ///
    /// Returns `RejectionReason::SessionClosed` if already completed.
    pub fn complete(
        &mut self,
        reason: Option<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), RejectionReason> {
        if self.projected().status == SessionStatus::Completed {
            return Err(RejectionReason::SessionClosed);
        }
        self.raise(
            SessionEventKind::SessionCompleted(SessionCompleted { reason }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Removes a participant from the rotation. A leaving turn-holder hands
    /// the turn on first; if nobody is left the session completes.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the session is paused or completed, or the
    /// participant has not joined.
    pub fn leave(
        &mut self,
        participant_id: Uuid,
        presence: &dyn Presence,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), RejectionReason> {
        let state = self.projected();
        match state.status {
            SessionStatus::Completed => return Err(RejectionReason::SessionClosed),
            SessionStatus::Paused => return Err(RejectionReason::SessionNotActive),
            SessionStatus::Pending | SessionStatus::Active => {}
        }
        if !state.has_joined(participant_id) {
            return Err(RejectionReason::NotAParticipant);
        }

        let holder_leaving = state.status == SessionStatus::Active
            && state.active_participant == Some(participant_id);
        let advance = if holder_leaving {
            state.plan_advance(presence, Some(participant_id))
        } else {
            None
        };
        if !holder_leaving {
            self.raise(
                SessionEventKind::ParticipantLeft(ParticipantLeft { participant_id }),
                correlation_id,
                clock,
            );
            return Ok(());
        }

        match advance {
            Some(advance) => {
                self.raise(
                    SessionEventKind::TurnAdvanced(TurnAdvanced {
                        advance,
                        reason: TurnAdvanceReason::ParticipantLeft,
                    }),
                    correlation_id,
                    clock,
                );
                self.raise(
                    SessionEventKind::ParticipantLeft(ParticipantLeft { participant_id }),
                    correlation_id,
                    clock,
                );
                self.trigger_due_timeline(correlation_id, clock);
            }
            None => {
                self.raise(
                    SessionEventKind::ParticipantLeft(ParticipantLeft { participant_id }),
                    correlation_id,
                    clock,
                );
                self.raise(
                    SessionEventKind::SessionCompleted(SessionCompleted {
                        reason: Some(ALL_PARTICIPANTS_LEFT.to_owned()),
                    }),
                    correlation_id,
                    clock,
                );
            }
        }
        Ok(())
    }
}

impl AggregateRoot for Session {
    type Event = SessionEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        self.state.apply(event);
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn take_uncommitted_events(&mut self) -> Vec<Self::Event> {
        self.projected = None;
        std::mem::take(&mut self.uncommitted_events)
    }
}
