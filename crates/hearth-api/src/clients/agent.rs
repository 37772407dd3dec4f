//! Agent responder client.

use async_trait::async_trait;
use hearth_core::action::ProposedAction;
use hearth_core::agent::{AgentContext, AgentResponder, AgentResponderError};
use tracing::debug;

use super::endpoint;

/// Asks the agent responder service for an AI agent's next action.
///
/// The orchestrator bounds every call with its own deadline, so no request
/// timeout is set here.
#[derive(Debug, Clone)]
pub struct HttpAgentResponder {
    client: reqwest::Client,
    url: String,
}

impl HttpAgentResponder {
    /// Creates a client for the responder at `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "agent-actions"),
        }
    }
}

#[async_trait]
impl AgentResponder for HttpAgentResponder {
    async fn request_action(
        &self,
        context: &AgentContext,
    ) -> Result<ProposedAction, AgentResponderError> {
        debug!(
            session_id = %context.session_id,
            participant_id = %context.participant_id,
            turn_number = context.turn_number,
            "requesting agent action"
        );

        let response = self
            .client
            .post(&self.url)
            .json(context)
            .send()
            .await
            .map_err(|e| AgentResponderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentResponderError::Unavailable(format!(
                "agent responder returned {status}"
            )));
        }

        response
            .json::<ProposedAction>()
            .await
            .map_err(|e| AgentResponderError::InvalidResponse(e.to_string()))
    }
}
