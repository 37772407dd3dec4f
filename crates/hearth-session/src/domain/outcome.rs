//! Proposal outcomes and rejection reasons.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why a proposal or control request was not admitted.
///
/// Rejections never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The session is pending or paused.
    #[error("session is not active")]
    SessionNotActive,

    /// The session is completed and accepts nothing further.
    #[error("session is closed")]
    SessionClosed,

    /// The proposer does not hold the turn.
    #[error("it is not this participant's turn")]
    NotYourTurn,

    /// The action payload is not valid for its kind.
    #[error("malformed action: {detail}")]
    MalformedAction {
        /// What was wrong.
        detail: String,
    },

    /// The participant is not in the session's turn rotation.
    #[error("participant has not joined this session")]
    NotAParticipant,

    /// The participant is not on the campaign roster.
    #[error("participant is not on the campaign roster")]
    UnknownParticipant,

    /// The participant is already in the rotation.
    #[error("participant has already joined")]
    AlreadyJoined,

    /// The session has already left the pending state.
    #[error("session has already started")]
    AlreadyStarted,

    /// Nobody has joined yet.
    #[error("session has no participants")]
    NoParticipants,

    /// Resume was requested for a session that is not paused.
    #[error("session is not paused")]
    SessionNotPaused,
}

impl RejectionReason {
    /// Shorthand for a `MalformedAction` rejection.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedAction {
            detail: detail.into(),
        }
    }
}

/// Where an admitted request landed in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Identifier of the primary event written for the request.
    pub event_id: Uuid,
    /// Sequence number of that event.
    pub sequence_number: i64,
}

/// The answer to a proposal or control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The request was appended to the event log.
    Admitted(Admission),
    /// The request was refused.
    Rejected {
        /// Why.
        reason: RejectionReason,
    },
}

impl Outcome {
    /// Builds a rejection outcome.
    #[must_use]
    pub fn rejected(reason: RejectionReason) -> Self {
        Self::Rejected { reason }
    }

    /// Returns `true` for admitted outcomes.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// Returns the admission, if any.
    #[must_use]
    pub fn admission(&self) -> Option<Admission> {
        match self {
            Self::Admitted(admission) => Some(*admission),
            Self::Rejected { .. } => None,
        }
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Admitted(_) => None,
            Self::Rejected { reason } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_outcome_serializes_with_reason_code() {
        let outcome = Outcome::rejected(RejectionReason::NotYourTurn);

        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["outcome"], "rejected");
        assert_eq!(json["reason"]["code"], "not_your_turn");
    }

    #[test]
    fn test_admitted_outcome_serializes_flat() {
        let event_id = Uuid::new_v4();
        let outcome = Outcome::Admitted(Admission {
            event_id,
            sequence_number: 4,
        });

        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["outcome"], "admitted");
        assert_eq!(json["sequence_number"], 4);
        assert_eq!(json["event_id"], event_id.to_string());
    }
}
