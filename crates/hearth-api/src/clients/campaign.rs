//! Campaign-management service client.

use async_trait::async_trait;
use hearth_core::campaign::{CampaignDirectory, Participant, TimelineEvent};
use hearth_core::error::DomainError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::endpoint;

/// Reads rosters and timelines from the campaign-management service.
#[derive(Debug, Clone)]
pub struct HttpCampaignDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCampaignDirectory {
    /// Creates a client for the service at `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        campaign_id: Uuid,
        resource: &str,
    ) -> Result<T, DomainError> {
        let url = endpoint(&self.base_url, &format!("campaigns/{campaign_id}/{resource}"));
        debug!(%campaign_id, %url, "fetching campaign data");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                DomainError::Infrastructure(format!("campaign service request failed: {e}"))
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DomainError::AggregateNotFound(campaign_id)),
            status if !status.is_success() => Err(DomainError::Infrastructure(format!(
                "campaign service returned {status} for {resource}"
            ))),
            _ => response.json::<T>().await.map_err(|e| {
                DomainError::Infrastructure(format!(
                    "campaign service sent an invalid {resource} body: {e}"
                ))
            }),
        }
    }
}

#[async_trait]
impl CampaignDirectory for HttpCampaignDirectory {
    async fn fetch_roster(&self, campaign_id: Uuid) -> Result<Vec<Participant>, DomainError> {
        self.get(campaign_id, "participants").await
    }

    async fn fetch_timeline(&self, campaign_id: Uuid) -> Result<Vec<TimelineEvent>, DomainError> {
        self.get(campaign_id, "timeline").await
    }
}
