//! Bridge to the agent responder.
//!
//! At most one agent request is in flight per session. Each request runs
//! under a deadline; a request that is cancelled or superseded has its
//! answer discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hearth_core::action::ProposedAction;
use hearth_core::agent::{AgentContext, AgentResponder};
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// What came back from one agent request.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    /// The agent proposed an action.
    Action(ProposedAction),
    /// The deadline elapsed first.
    Timeout,
    /// The responder failed.
    Failed(String),
}

#[derive(Debug)]
struct InFlight {
    request_id: Uuid,
    participant_id: Uuid,
    abort: Option<AbortHandle>,
}

/// Tracks and performs agent requests.
pub struct AgentGateway {
    responder: Arc<dyn AgentResponder>,
    deadline: Duration,
    in_flight: Mutex<HashMap<Uuid, InFlight>>,
}

impl std::fmt::Debug for AgentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentGateway")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl AgentGateway {
    /// Creates a gateway with the given per-request deadline.
    #[must_use]
    pub fn new(responder: Arc<dyn AgentResponder>, deadline: Duration) -> Self {
        Self {
            responder,
            deadline,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<Uuid, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configured deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Registers a new request for an agent's turn and returns its id.
    ///
    /// Returns `None` if a request for the same agent is already in flight.
    /// A request for a different participant is aborted and replaced.
    pub fn begin(&self, session_id: Uuid, participant_id: Uuid) -> Option<Uuid> {
        let mut in_flight = self.in_flight();
        if in_flight
            .get(&session_id)
            .is_some_and(|existing| existing.participant_id == participant_id)
        {
            return None;
        }
        let request_id = Uuid::new_v4();
        let previous = in_flight.insert(
            session_id,
            InFlight {
                request_id,
                participant_id,
                abort: None,
            },
        );
        if let Some(previous) = previous {
            debug!(%session_id, request_id = %previous.request_id, "superseding agent request");
            if let Some(abort) = previous.abort {
                abort.abort();
            }
        }
        Some(request_id)
    }

    /// Attaches the task running a request so it can be aborted.
    pub fn attach(&self, session_id: Uuid, request_id: Uuid, abort: AbortHandle) {
        let mut in_flight = self.in_flight();
        match in_flight.get_mut(&session_id) {
            Some(entry) if entry.request_id == request_id => entry.abort = Some(abort),
            // Already finished or cancelled.
            _ => {}
        }
    }

    /// Marks a request finished. Returns `false` if it was cancelled or
    /// superseded, in which case its answer must be discarded.
    pub fn finish(&self, session_id: Uuid, request_id: Uuid) -> bool {
        let mut in_flight = self.in_flight();
        match in_flight.get(&session_id) {
            Some(entry) if entry.request_id == request_id => {
                in_flight.remove(&session_id);
                true
            }
            _ => false,
        }
    }

    /// Cancels the session's in-flight request, if any.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        let entry = self.in_flight().remove(&session_id);
        Self::abort(session_id, entry)
    }

    /// Cancels the in-flight request unless it belongs to `keep`.
    pub fn cancel_unless(&self, session_id: Uuid, keep: Option<Uuid>) -> bool {
        let entry = {
            let mut in_flight = self.in_flight();
            match in_flight.get(&session_id) {
                Some(entry) if Some(entry.participant_id) != keep => in_flight.remove(&session_id),
                _ => None,
            }
        };
        Self::abort(session_id, entry)
    }

    fn abort(session_id: Uuid, entry: Option<InFlight>) -> bool {
        let Some(entry) = entry else {
            return false;
        };
        debug!(%session_id, request_id = %entry.request_id, "cancelled agent request");
        if let Some(abort) = entry.abort {
            abort.abort();
        }
        true
    }

    /// The request currently in flight for a session.
    #[must_use]
    pub fn current_request(&self, session_id: Uuid) -> Option<Uuid> {
        self.in_flight().get(&session_id).map(|e| e.request_id)
    }

    /// Asks the responder for an action, bounded by the deadline.
    pub async fn request(&self, context: &AgentContext) -> AgentReply {
        match tokio::time::timeout(self.deadline, self.responder.request_action(context)).await {
            Ok(Ok(action)) => AgentReply::Action(action),
            Ok(Err(e)) => {
                warn!(
                    session_id = %context.session_id,
                    participant_id = %context.participant_id,
                    error = %e,
                    "agent responder failed"
                );
                AgentReply::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    session_id = %context.session_id,
                    participant_id = %context.participant_id,
                    deadline_ms = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX),
                    "agent responder timed out"
                );
                AgentReply::Timeout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hearth_test_support::{FailingAgentResponder, ScriptedAgentResponder, SilentAgentResponder};
    use serde_json::json;

    use super::*;

    fn context() -> AgentContext {
        AgentContext {
            session_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            turn_number: 1,
            snapshot: json!({}),
            recent_events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_request_returns_agent_action() {
        let action = ProposedAction::new("narrate", json!({ "text": "Thunder rolls." }));
        let responder = Arc::new(ScriptedAgentResponder::new(vec![Ok(action.clone())]));
        let gateway = AgentGateway::new(responder, Duration::from_secs(1));

        let reply = gateway.request(&context()).await;

        assert_eq!(reply, AgentReply::Action(action));
    }

    #[tokio::test]
    async fn test_request_times_out_on_silent_responder() {
        let gateway = AgentGateway::new(Arc::new(SilentAgentResponder), Duration::from_millis(20));

        let reply = gateway.request(&context()).await;

        assert_eq!(reply, AgentReply::Timeout);
    }

    #[tokio::test]
    async fn test_request_reports_responder_failure() {
        let gateway = AgentGateway::new(Arc::new(FailingAgentResponder), Duration::from_secs(1));

        let reply = gateway.request(&context()).await;

        assert!(matches!(reply, AgentReply::Failed(message) if message.contains("offline")));
    }

    #[test]
    fn test_begin_deduplicates_same_agent_and_supersedes_others() {
        // Arrange
        let gateway = AgentGateway::new(Arc::new(SilentAgentResponder), Duration::from_secs(1));
        let session_id = Uuid::new_v4();
        let oracle = Uuid::new_v4();
        let sibyl = Uuid::new_v4();

        // Act
        let first = gateway.begin(session_id, oracle).unwrap();
        let duplicate = gateway.begin(session_id, oracle);
        let second = gateway.begin(session_id, sibyl).unwrap();

        // Assert
        assert!(duplicate.is_none());
        assert!(!gateway.finish(session_id, first));
        assert_eq!(gateway.current_request(session_id), Some(second));
        assert!(gateway.finish(session_id, second));
        assert!(gateway.current_request(session_id).is_none());
    }

    #[test]
    fn test_cancel_unless_keeps_matching_agent() {
        let gateway = AgentGateway::new(Arc::new(SilentAgentResponder), Duration::from_secs(1));
        let session_id = Uuid::new_v4();
        let oracle = Uuid::new_v4();
        let request_id = gateway.begin(session_id, oracle).unwrap();

        assert!(!gateway.cancel_unless(session_id, Some(oracle)));
        assert!(gateway.cancel_unless(session_id, None));
        assert!(!gateway.finish(session_id, request_id));
    }

    #[test]
    fn test_cancel_unless_leaves_replacement_request_alone() {
        // Arrange
        let gateway = AgentGateway::new(Arc::new(SilentAgentResponder), Duration::from_secs(1));
        let session_id = Uuid::new_v4();
        let oracle = Uuid::new_v4();
        let sibyl = Uuid::new_v4();
        gateway.begin(session_id, oracle).unwrap();
        let replacement = gateway.begin(session_id, sibyl).unwrap();

        // Act
        let cancelled = gateway.cancel_unless(session_id, Some(sibyl));

        // Assert
        assert!(!cancelled);
        assert_eq!(gateway.current_request(session_id), Some(replacement));
        assert!(gateway.cancel_unless(session_id, Some(oracle)));
        assert!(gateway.current_request(session_id).is_none());
    }

    #[tokio::test]
    async fn test_cancel_aborts_attached_task() {
        // Arrange
        let gateway = AgentGateway::new(Arc::new(SilentAgentResponder), Duration::from_secs(60));
        let session_id = Uuid::new_v4();
        let request_id = gateway.begin(session_id, Uuid::new_v4()).unwrap();
        let task = tokio::spawn(std::future::pending::<()>());
        gateway.attach(session_id, request_id, task.abort_handle());

        // Act
        assert!(gateway.cancel(session_id));

        // Assert
        let result = task.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
