//! The session projection and its fold.
//!
//! `SessionState::apply` is the only way state changes. It is pure and
//! synchronous, so replaying a stream from sequence 1 always reproduces the
//! live state. Anything non-deterministic (connection status, clock) is
//! resolved when an event is decided and recorded in the event itself.

use std::collections::{BTreeMap, HashMap, HashSet};

use hearth_core::campaign::{Participant, ParticipantKind, TimelineEvent, TimelineTrigger};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{SessionEvent, SessionEventKind, TurnAdvance};
use super::outcome::Admission;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Opened, waiting to start.
    #[default]
    Pending,
    /// Accepting actions from the turn-holder.
    Active,
    /// Holding state; accepts only resume or completion.
    Paused,
    /// Terminal.
    Completed,
}

/// Transient connection status lookup for human participants.
pub trait Presence {
    /// Whether the participant currently has a live connection.
    fn is_connected(&self, participant_id: Uuid) -> bool;
}

impl Presence for HashSet<Uuid> {
    fn is_connected(&self, participant_id: Uuid) -> bool {
        self.contains(&participant_id)
    }
}

impl<V> Presence for HashMap<Uuid, V> {
    fn is_connected(&self, participant_id: Uuid) -> bool {
        self.contains_key(&participant_id)
    }
}

/// Authoritative in-memory projection of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Campaign being played; `None` until `SessionCreated` is applied.
    pub campaign_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Campaign roster snapshot.
    pub roster: Vec<Participant>,
    /// Turn rotation, by participant id.
    pub participants: Vec<Uuid>,
    /// Current turn-holder.
    pub active_participant: Option<Uuid>,
    /// Rotation count, starting at 1.
    pub turn_number: u32,
    /// Number of turn-consuming actions admitted.
    pub turns_taken: u64,
    /// Timeline snapshot, ordered by position.
    pub timeline: Vec<TimelineEvent>,
    /// Index of the next timeline event to fire.
    pub timeline_cursor: usize,
    /// Explicit advance flag raised and not yet consumed.
    pub timeline_flag: bool,
    /// Sequence number of the last applied event.
    pub last_sequence_number: i64,
    /// Idempotency token → admission, for every admitted action.
    pub admitted_tokens: BTreeMap<String, Admission>,
}

impl SessionState {
    /// Folds one event into the state.
    pub fn apply(&mut self, event: &SessionEvent) {
        match &event.kind {
            SessionEventKind::SessionCreated(payload) => {
                self.campaign_id = Some(payload.campaign_id);
                self.status = SessionStatus::Pending;
                self.roster.clone_from(&payload.roster);
                self.timeline.clone_from(&payload.timeline);
            }
            SessionEventKind::ParticipantJoined(payload) => {
                self.participants.push(payload.participant_id);
            }
            SessionEventKind::SessionStarted(payload) => {
                self.status = SessionStatus::Active;
                self.active_participant = Some(payload.first_participant_id);
                self.turn_number = payload.turn_number;
            }
            SessionEventKind::ActionAccepted(payload) => {
                self.admitted_tokens.insert(
                    payload.idempotency_token.clone(),
                    Admission {
                        event_id: event.metadata.event_id,
                        sequence_number: event.metadata.sequence_number,
                    },
                );
                if payload.turn_consuming {
                    self.turns_taken += 1;
                }
                if payload.raises_timeline_flag {
                    self.timeline_flag = true;
                }
                if let Some(advance) = &payload.advance {
                    self.apply_advance(advance);
                }
            }
            SessionEventKind::TurnAdvanced(payload) => {
                self.apply_advance(&payload.advance);
            }
            SessionEventKind::TimelineTriggered(payload) => {
                let explicit = self
                    .timeline
                    .get(self.timeline_cursor)
                    .is_some_and(|t| t.trigger == TimelineTrigger::Explicit);
                if explicit {
                    self.timeline_flag = false;
                }
                self.timeline_cursor = payload.cursor;
            }
            SessionEventKind::ParticipantLeft(payload) => {
                self.participants.retain(|id| *id != payload.participant_id);
                if self.active_participant == Some(payload.participant_id) {
                    self.active_participant = None;
                }
            }
            SessionEventKind::SessionPaused => {
                self.status = SessionStatus::Paused;
            }
            SessionEventKind::SessionResumed => {
                self.status = SessionStatus::Active;
            }
            SessionEventKind::SessionCompleted(_) => {
                self.status = SessionStatus::Completed;
                self.active_participant = None;
            }
        }
        self.last_sequence_number = event.metadata.sequence_number;
    }

    fn apply_advance(&mut self, advance: &TurnAdvance) {
        self.active_participant = Some(advance.to_participant_id);
        self.turn_number = advance.turn_number;
    }

    /// Returns `true` once `SessionCreated` has been applied.
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.campaign_id.is_some()
    }

    /// Looks up a roster entry.
    #[must_use]
    pub fn roster_entry(&self, participant_id: Uuid) -> Option<&Participant> {
        self.roster.iter().find(|p| p.id == participant_id)
    }

    /// Whether the participant is in the turn rotation.
    #[must_use]
    pub fn has_joined(&self, participant_id: Uuid) -> bool {
        self.participants.contains(&participant_id)
    }

    /// Index of the turn-holder within the rotation.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        let active = self.active_participant?;
        self.participants.iter().position(|id| *id == active)
    }

    /// The turn-holder's roster entry.
    #[must_use]
    pub fn active_roster_entry(&self) -> Option<&Participant> {
        self.active_participant.and_then(|id| self.roster_entry(id))
    }

    /// Whether an AI agent currently holds the turn of an active session.
    #[must_use]
    pub fn agent_holds_turn(&self) -> bool {
        self.status == SessionStatus::Active
            && self
                .active_roster_entry()
                .is_some_and(|p| p.kind == ParticipantKind::AiAgent)
    }

    fn is_eligible(&self, participant_id: Uuid, presence: &dyn Presence) -> bool {
        match self.roster_entry(participant_id).map(|p| p.kind) {
            Some(ParticipantKind::AiAgent) => true,
            Some(ParticipantKind::Human) => presence.is_connected(participant_id),
            None => false,
        }
    }

    /// Plans the next turn advance from the current holder.
    ///
    /// Walks the rotation forward. AI agents are always eligible; humans only
    /// while connected, and a disconnected human is passed over (recorded in
    /// `skipped`). If a whole cycle yields nobody eligible, the next slot is
    /// assigned anyway. `excluding` is never chosen; it is the participant
    /// about to leave. Returns `None` when no other candidate exists.
    #[must_use]
    pub fn plan_advance(
        &self,
        presence: &dyn Presence,
        excluding: Option<Uuid>,
    ) -> Option<TurnAdvance> {
        let from = self.active_participant?;
        let current = self.active_index()?;
        let len = self.participants.len();

        let candidates = (1..=len).filter_map(|step| {
            let id = self.participants[(current + step) % len];
            (Some(id) != excluding).then_some((id, current + step >= len))
        });

        let mut skipped = Vec::new();
        let mut fallback = None;
        for (id, wrapped) in candidates {
            if fallback.is_none() {
                fallback = Some((id, wrapped));
            }
            if self.is_eligible(id, presence) {
                return Some(self.advance_to(from, id, wrapped, skipped));
            }
            skipped.push(id);
        }

        fallback.map(|(id, wrapped)| self.advance_to(from, id, wrapped, Vec::new()))
    }

    fn advance_to(&self, from: Uuid, to: Uuid, wrapped: bool, skipped: Vec<Uuid>) -> TurnAdvance {
        TurnAdvance {
            from_participant_id: from,
            to_participant_id: to,
            turn_number: if wrapped {
                self.turn_number + 1
            } else {
                self.turn_number
            },
            skipped,
        }
    }

    /// The timeline event at the cursor, if its trigger is satisfied.
    #[must_use]
    pub fn due_timeline_event(&self) -> Option<&TimelineEvent> {
        let next = self.timeline.get(self.timeline_cursor)?;
        let due = match next.trigger {
            TimelineTrigger::TurnReached { turn } => self.turn_number >= turn,
            TimelineTrigger::Explicit => self.timeline_flag,
        };
        due.then_some(next)
    }
}
