//! Campaign-management collaborator port.
//!
//! The campaign directory owns participants and timeline events. The
//! orchestrator reads both once, when a session is opened, and keeps a
//! snapshot inside the session stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Whether a participant is a person or an AI agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// A human player.
    Human,
    /// An AI agent driven by the agent responder.
    AiAgent,
}

/// A roster entry for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: Uuid,
    /// Human or AI agent.
    pub kind: ParticipantKind,
    /// Display identity.
    pub display_name: String,
}

/// When a timeline event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineTrigger {
    /// Fires once the session reaches the given turn number.
    TurnReached {
        /// Turn number (1-based).
        turn: u32,
    },
    /// Fires when a participant raises the explicit advance flag.
    Explicit,
}

/// A campaign-authored scripted occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Timeline event identifier.
    pub id: Uuid,
    /// Ordered position within the campaign timeline.
    pub position: u32,
    /// Condition under which the event fires.
    pub trigger: TimelineTrigger,
    /// Effect payload, opaque to the orchestrator.
    #[serde(default)]
    pub effect: serde_json::Value,
}

/// Read-only access to campaign data owned by the campaign-management service.
#[async_trait]
pub trait CampaignDirectory: Send + Sync {
    /// Fetches the participant roster for a campaign.
    async fn fetch_roster(&self, campaign_id: Uuid) -> Result<Vec<Participant>, DomainError>;

    /// Fetches the campaign's timeline events.
    async fn fetch_timeline(&self, campaign_id: Uuid) -> Result<Vec<TimelineEvent>, DomainError>;
}
