//! Test campaign directories.

use async_trait::async_trait;
use hearth_core::campaign::{
    CampaignDirectory, Participant, ParticipantKind, TimelineEvent,
};
use hearth_core::error::DomainError;
use uuid::Uuid;

/// A campaign directory that serves the same roster and timeline for any
/// campaign id.
#[derive(Debug, Clone, Default)]
pub struct StaticCampaignDirectory {
    roster: Vec<Participant>,
    timeline: Vec<TimelineEvent>,
}

impl StaticCampaignDirectory {
    /// Creates a directory serving `roster` and `timeline`.
    #[must_use]
    pub fn new(roster: Vec<Participant>, timeline: Vec<TimelineEvent>) -> Self {
        Self { roster, timeline }
    }
}

#[async_trait]
impl CampaignDirectory for StaticCampaignDirectory {
    async fn fetch_roster(&self, _campaign_id: Uuid) -> Result<Vec<Participant>, DomainError> {
        Ok(self.roster.clone())
    }

    async fn fetch_timeline(
        &self,
        _campaign_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, DomainError> {
        Ok(self.timeline.clone())
    }
}

/// A campaign directory whose every call fails with an infrastructure error.
#[derive(Debug)]
pub struct FailingCampaignDirectory;

#[async_trait]
impl CampaignDirectory for FailingCampaignDirectory {
    async fn fetch_roster(&self, _campaign_id: Uuid) -> Result<Vec<Participant>, DomainError> {
        Err(DomainError::Infrastructure("campaign service unreachable".into()))
    }

    async fn fetch_timeline(
        &self,
        _campaign_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, DomainError> {
        Err(DomainError::Infrastructure("campaign service unreachable".into()))
    }
}

/// Builds a human roster entry with a fresh id.
#[must_use]
pub fn human(display_name: &str) -> Participant {
    Participant {
        id: Uuid::new_v4(),
        kind: ParticipantKind::Human,
        display_name: display_name.to_owned(),
    }
}

/// Builds an AI agent roster entry with a fresh id.
#[must_use]
pub fn ai_agent(display_name: &str) -> Participant {
    Participant {
        id: Uuid::new_v4(),
        kind: ParticipantKind::AiAgent,
        display_name: display_name.to_owned(),
    }
}
