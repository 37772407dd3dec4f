//! Agent responder port.
//!
//! The responder is an opaque external capability. Only the latency and the
//! success/failure shape of a call matter to the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::action::ProposedAction;

/// Everything the responder is given to produce an AI agent's action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    /// Session the turn belongs to.
    pub session_id: Uuid,
    /// Campaign being played.
    pub campaign_id: Uuid,
    /// The AI agent participant holding the turn.
    pub participant_id: Uuid,
    /// Current turn number.
    pub turn_number: u32,
    /// Snapshot of the session at request time.
    pub snapshot: serde_json::Value,
    /// Most recent session events, oldest first.
    pub recent_events: Vec<serde_json::Value>,
}

/// Failure reported by an agent responder.
#[derive(Debug, Error)]
pub enum AgentResponderError {
    /// The responder could not be reached or failed.
    #[error("agent responder unavailable: {0}")]
    Unavailable(String),

    /// The responder answered with something that is not an action.
    #[error("agent responder returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// External capability producing an AI agent's next action.
#[async_trait]
pub trait AgentResponder: Send + Sync {
    /// Requests the agent's action for the given context.
    async fn request_action(
        &self,
        context: &AgentContext,
    ) -> Result<ProposedAction, AgentResponderError>;
}
