//! Tunables for the session orchestrator.

use std::time::Duration;

/// Default deadline for one agent responder call.
pub const DEFAULT_AGENT_DEADLINE: Duration = Duration::from_secs(30);

/// Default number of undelivered updates a subscriber may queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Default number of recent events included in an agent context.
pub const DEFAULT_AGENT_CONTEXT_EVENTS: usize = 20;

/// Orchestrator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// How long an AI agent may take to produce its action.
    pub agent_deadline: Duration,
    /// Queue bound after which a subscriber is told to resync.
    pub subscriber_queue_capacity: usize,
    /// Size of the recent-event window handed to the agent responder.
    pub agent_context_events: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_deadline: DEFAULT_AGENT_DEADLINE,
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            agent_context_events: DEFAULT_AGENT_CONTEXT_EVENTS,
        }
    }
}

impl OrchestratorConfig {
    /// Returns a copy with a different agent deadline.
    #[must_use]
    pub fn with_agent_deadline(mut self, deadline: Duration) -> Self {
        self.agent_deadline = deadline;
        self
    }

    /// Returns a copy with a different subscriber queue capacity.
    #[must_use]
    pub fn with_subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }
}
