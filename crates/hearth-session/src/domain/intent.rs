//! Typed interpretation of proposed actions.

use hearth_core::action::ProposedAction;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Action kind names understood by the state machine.
pub mod kinds {
    /// Table talk; any participant, any time.
    pub const CHAT: &str = "chat";
    /// Move a character to another location.
    pub const MOVE: &str = "move";
    /// Attack a target.
    pub const ATTACK: &str = "attack";
    /// Report the result of a skill check.
    pub const RESOLVE_CHECK: &str = "resolve_check";
    /// Narrative prose, typically from an AI agent.
    pub const NARRATE: &str = "narrate";
    /// Raise the explicit timeline flag.
    pub const ADVANCE_TIMELINE: &str = "advance_timeline";
    /// Give up the turn.
    pub const PASS: &str = "pass";
}

/// Why a turn was passed, when the orchestrator passes it on an agent's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassReason {
    /// The agent responder missed its deadline.
    AgentTimeout,
    /// The agent responder failed.
    AgentError,
    /// The agent's own action was malformed.
    AgentRejected,
}

impl PassReason {
    /// Wire name used in `pass` payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentTimeout => "agent_timeout",
            Self::AgentError => "agent_error",
            Self::AgentRejected => "agent_rejected",
        }
    }
}

/// A structurally valid action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionIntent {
    /// Table talk.
    Chat {
        /// Message text.
        message: String,
    },
    /// Character movement.
    Move {
        /// Character being moved.
        character_id: Uuid,
        /// Destination location.
        destination_id: Uuid,
    },
    /// An attack.
    Attack {
        /// Target character or creature.
        target_id: Uuid,
        /// Weapon used, if named.
        weapon: Option<String>,
    },
    /// A resolved skill check.
    ResolveCheck {
        /// Skill tested.
        skill: String,
        /// Difficulty class.
        difficulty_class: i32,
        /// Natural d20 roll.
        roll: u32,
    },
    /// Narrative prose.
    Narrate {
        /// Prose text.
        text: String,
    },
    /// Raise the explicit timeline flag.
    AdvanceTimeline,
    /// Give up the turn.
    Pass {
        /// Set when the orchestrator passed on an agent's behalf.
        reason: Option<PassReason>,
    },
}

#[derive(Deserialize)]
struct ChatPayload {
    message: String,
}

#[derive(Deserialize)]
struct MovePayload {
    character_id: Uuid,
    destination_id: Uuid,
}

#[derive(Deserialize)]
struct AttackPayload {
    target_id: Uuid,
    #[serde(default)]
    weapon: Option<String>,
}

#[derive(Deserialize)]
struct ResolveCheckPayload {
    skill: String,
    difficulty_class: i32,
    roll: u32,
}

#[derive(Deserialize)]
struct NarratePayload {
    text: String,
}

#[derive(Deserialize, Default)]
struct PassPayload {
    #[serde(default)]
    reason: Option<PassReason>,
}

fn decode<T: DeserializeOwned>(kind: &str, payload: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(payload.clone()).map_err(|e| format!("invalid {kind} payload: {e}"))
}

fn non_empty(field: &str, value: String) -> Result<String, String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(value)
    }
}

/// Whether an action of this kind may be proposed by someone who does not
/// hold the turn.
#[must_use]
pub fn is_proposer_agnostic(kind: &str) -> bool {
    kind == kinds::CHAT
}

impl ActionIntent {
    /// Validates a proposed action and returns its typed form.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unknown kinds or payloads
    /// that do not fit the kind.
    pub fn parse(action: &ProposedAction) -> Result<Self, String> {
        let kind = action.kind.as_str();
        // A missing payload arrives as JSON null; treat it as an empty object.
        let empty = serde_json::Value::Object(serde_json::Map::new());
        let payload = if action.payload.is_null() {
            &empty
        } else {
            &action.payload
        };

        match kind {
            kinds::CHAT => {
                let p: ChatPayload = decode(kind, payload)?;
                Ok(Self::Chat {
                    message: non_empty("message", p.message)?,
                })
            }
            kinds::MOVE => {
                let p: MovePayload = decode(kind, payload)?;
                Ok(Self::Move {
                    character_id: p.character_id,
                    destination_id: p.destination_id,
                })
            }
            kinds::ATTACK => {
                let p: AttackPayload = decode(kind, payload)?;
                Ok(Self::Attack {
                    target_id: p.target_id,
                    weapon: p.weapon,
                })
            }
            kinds::RESOLVE_CHECK => {
                let p: ResolveCheckPayload = decode(kind, payload)?;
                if !(1..=20).contains(&p.roll) {
                    return Err(format!("roll must be between 1 and 20, got {}", p.roll));
                }
                Ok(Self::ResolveCheck {
                    skill: non_empty("skill", p.skill)?,
                    difficulty_class: p.difficulty_class,
                    roll: p.roll,
                })
            }
            kinds::NARRATE => {
                let p: NarratePayload = decode(kind, payload)?;
                Ok(Self::Narrate {
                    text: non_empty("text", p.text)?,
                })
            }
            kinds::ADVANCE_TIMELINE => Ok(Self::AdvanceTimeline),
            kinds::PASS => {
                let p: PassPayload = decode(kind, payload)?;
                Ok(Self::Pass { reason: p.reason })
            }
            other => Err(format!("unknown action kind: {other:?}")),
        }
    }

    /// Whether admitting this action ends the proposer's turn.
    #[must_use]
    pub fn is_turn_consuming(&self) -> bool {
        !matches!(self, Self::Chat { .. })
    }

    /// Whether admitting this action raises the explicit timeline flag.
    #[must_use]
    pub fn raises_timeline_flag(&self) -> bool {
        matches!(self, Self::AdvanceTimeline)
    }
}
