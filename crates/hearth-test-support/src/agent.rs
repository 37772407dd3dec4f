//! Test agent responders.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::action::ProposedAction;
use hearth_core::agent::{AgentContext, AgentResponder, AgentResponderError};

/// Replays a scripted list of replies, one per call, then answers `pass`
/// forever. Records every context it was asked about.
#[derive(Debug, Default)]
pub struct ScriptedAgentResponder {
    replies: Mutex<VecDeque<Result<ProposedAction, String>>>,
    requests: Mutex<Vec<AgentContext>>,
    delay: Option<Duration>,
}

impl ScriptedAgentResponder {
    /// Creates a responder that answers with `replies` in order.
    #[must_use]
    pub fn new(replies: Vec<Result<ProposedAction, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Makes every reply wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the contexts received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn requests(&self) -> Vec<AgentContext> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentResponder for ScriptedAgentResponder {
    async fn request_action(
        &self,
        context: &AgentContext,
    ) -> Result<ProposedAction, AgentResponderError> {
        self.requests.lock().unwrap().push(context.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Ok(action)) => Ok(action),
            Some(Err(message)) => Err(AgentResponderError::Unavailable(message)),
            None => Ok(ProposedAction::pass(None)),
        }
    }
}

/// A responder that never answers.
#[derive(Debug, Default)]
pub struct SilentAgentResponder;

#[async_trait]
impl AgentResponder for SilentAgentResponder {
    async fn request_action(
        &self,
        _context: &AgentContext,
    ) -> Result<ProposedAction, AgentResponderError> {
        std::future::pending().await
    }
}

/// A responder that fails every call immediately.
#[derive(Debug, Default)]
pub struct FailingAgentResponder;

#[async_trait]
impl AgentResponder for FailingAgentResponder {
    async fn request_action(
        &self,
        _context: &AgentContext,
    ) -> Result<ProposedAction, AgentResponderError> {
        Err(AgentResponderError::Unavailable("model backend offline".into()))
    }
}
