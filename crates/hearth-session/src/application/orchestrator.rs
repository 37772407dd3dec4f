//! Public entry point for driving live sessions.
//!
//! The orchestrator turns requests into commands, hands them to the
//! arbiter, and keeps AI agents moving: whenever an agent holds the turn it
//! asks the agent responder, and proposes the answer (or a fallback `pass`)
//! through the same path a human proposal takes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hearth_core::action::ProposedAction;
use hearth_core::agent::AgentResponder;
use hearth_core::campaign::CampaignDirectory;
use hearth_core::clock::Clock;
use hearth_core::error::DomainError;
use hearth_core::repository::EventRepository;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::arbiter::{AgentTurn, Arbiter, Decision};
use super::broadcaster::{SessionBroadcaster, Subscription};
use super::config::OrchestratorConfig;
use super::gateway::{AgentGateway, AgentReply};
use super::query_handlers::SessionView;
use crate::domain::commands::{
    BeginSession, CompleteSession, JoinSession, LeaveSession, OpenSession, PauseSession,
    ProposeAction, ResumeSession,
};
use crate::domain::intent::PassReason;
use crate::domain::outcome::{Outcome, RejectionReason};

/// Idempotency token for an agent's own answer.
fn agent_token(request_id: Uuid) -> String {
    format!("agent:{request_id}")
}

/// Idempotency token for the `pass` proposed on an agent's behalf.
fn fallback_token(request_id: Uuid) -> String {
    format!("agent:{request_id}:fallback")
}

struct Inner {
    arbiter: Arbiter,
    gateway: AgentGateway,
    campaigns: Arc<dyn CampaignDirectory>,
    config: OrchestratorConfig,
}

/// Drives sessions: proposals, lifecycle control, subscriptions.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn EventRepository>,
        campaigns: Arc<dyn CampaignDirectory>,
        responder: Arc<dyn AgentResponder>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let broadcaster = SessionBroadcaster::new(config.subscriber_queue_capacity);
        Self {
            inner: Arc::new(Inner {
                arbiter: Arbiter::new(repository, clock, broadcaster, config.agent_context_events),
                gateway: AgentGateway::new(responder, config.agent_deadline),
                campaigns,
                config,
            }),
        }
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> OrchestratorConfig {
        self.inner.config
    }

    /// The agent gateway.
    #[must_use]
    pub fn gateway(&self) -> &AgentGateway {
        &self.inner.gateway
    }

    /// Opens a session for a campaign, joins the whole roster in roster
    /// order, and starts it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a campaign without participants,
    /// or any error of the campaign directory or the event log.
    pub async fn start_session(&self, campaign_id: Uuid) -> Result<Decision, DomainError> {
        self.create(campaign_id, true).await
    }

    /// Opens a pending session for a campaign. Participants join one by one
    /// and the session starts with [`Self::begin_session`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a campaign without participants,
    /// or any error of the campaign directory or the event log.
    pub async fn open_session(&self, campaign_id: Uuid) -> Result<Decision, DomainError> {
        self.create(campaign_id, false).await
    }

    async fn create(&self, campaign_id: Uuid, start: bool) -> Result<Decision, DomainError> {
        let roster = self.inner.campaigns.fetch_roster(campaign_id).await?;
        if roster.is_empty() {
            return Err(DomainError::Validation(format!(
                "campaign {campaign_id} has no participants"
            )));
        }
        let timeline = self.inner.campaigns.fetch_timeline(campaign_id).await?;
        let command = OpenSession {
            correlation_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            campaign_id,
        };
        info!(
            session_id = %command.session_id,
            %campaign_id,
            participants = roster.len(),
            timeline_events = timeline.len(),
            start,
            "opening session"
        );
        let decision = self
            .inner
            .arbiter
            .create(&command, roster, timeline, start)
            .await?;
        Ok(self.follow_up(decision))
    }

    /// Adds a roster participant to the rotation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn join_session(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Decision, DomainError> {
        let command = JoinSession {
            correlation_id: Uuid::new_v4(),
            session_id,
            participant_id,
        };
        let decision = self.inner.arbiter.join(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Starts a pending session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn begin_session(&self, session_id: Uuid) -> Result<Decision, DomainError> {
        let command = BeginSession {
            correlation_id: Uuid::new_v4(),
            session_id,
        };
        let decision = self.inner.arbiter.begin(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Submits a participant's proposed action. A session that does not
    /// exist answers `SessionNotActive`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn propose_action(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        action: ProposedAction,
        idempotency_token: impl Into<String>,
    ) -> Result<Outcome, DomainError> {
        let command = ProposeAction {
            correlation_id: Uuid::new_v4(),
            session_id,
            participant_id,
            action,
            idempotency_token: idempotency_token.into(),
        };
        debug!(
            %session_id,
            %participant_id,
            kind = %command.action.kind,
            correlation_id = %command.correlation_id,
            "handling propose_action command"
        );
        match self.inner.arbiter.propose(&command).await {
            Ok(decision) => Ok(self.follow_up(decision).outcome),
            // Proposals answer with an outcome even when the session is unknown.
            Err(DomainError::AggregateNotFound(id)) if id == session_id => {
                debug!(%session_id, "proposal for unknown session");
                Ok(Outcome::rejected(RejectionReason::SessionNotActive))
            }
            Err(e) => Err(e),
        }
    }

    /// Pauses an active session, cancelling any in-flight agent request.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn pause_session(&self, session_id: Uuid) -> Result<Decision, DomainError> {
        let command = PauseSession {
            correlation_id: Uuid::new_v4(),
            session_id,
        };
        let decision = self.inner.arbiter.pause(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Resumes a paused session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn resume_session(&self, session_id: Uuid) -> Result<Decision, DomainError> {
        let command = ResumeSession {
            correlation_id: Uuid::new_v4(),
            session_id,
        };
        let decision = self.inner.arbiter.resume(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Completes a session and closes its subscriptions.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn complete_session(
        &self,
        session_id: Uuid,
        reason: Option<String>,
    ) -> Result<Decision, DomainError> {
        let command = CompleteSession {
            correlation_id: Uuid::new_v4(),
            session_id,
            reason,
        };
        let decision = self.inner.arbiter.complete(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Removes a participant from the rotation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn leave_session(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Decision, DomainError> {
        let command = LeaveSession {
            correlation_id: Uuid::new_v4(),
            session_id,
            participant_id,
        };
        let decision = self.inner.arbiter.leave(&command).await?;
        Ok(self.follow_up(decision))
    }

    /// Current view of a session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for unknown sessions.
    pub async fn session_view(&self, session_id: Uuid) -> Result<SessionView, DomainError> {
        let (view, agent_turn) = self.inner.arbiter.view(session_id).await?;
        if let Some(turn) = agent_turn {
            self.dispatch_agent_turn(turn);
        }
        Ok(view)
    }

    /// Opens a subscription: a snapshot first, then every committed delta
    /// in order. A subscription on behalf of a participant marks them
    /// connected for turn rotation until [`Self::unsubscribe`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError` for unknown sessions or participants.
    pub async fn subscribe(
        &self,
        session_id: Uuid,
        participant_id: Option<Uuid>,
    ) -> Result<Subscription, DomainError> {
        let (subscription, agent_turn) = self
            .inner
            .arbiter
            .subscribe(session_id, participant_id)
            .await?;
        if let Some(turn) = agent_turn {
            self.dispatch_agent_turn(turn);
        }
        Ok(subscription)
    }

    /// Closes a subscription.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        self.inner.arbiter.unsubscribe(&subscription).await;
    }

    /// Replaces a subscription that was told to resync with a fresh one
    /// under the same identity.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session can no longer be subscribed to.
    pub async fn resync(&self, subscription: Subscription) -> Result<Subscription, DomainError> {
        let session_id = subscription.session_id;
        let participant_id = subscription.participant_id;
        // Subscribe first so the participant never reads as disconnected.
        let fresh = self.subscribe(session_id, participant_id).await;
        self.unsubscribe(subscription).await;
        fresh
    }

    /// Keeps the agent gateway in step with the session after a command.
    fn follow_up(&self, decision: Decision) -> Decision {
        let session_id = decision.view.session_id;
        if decision.outcome.is_admitted() {
            self.inner.gateway.cancel_unless(
                session_id,
                decision.agent_turn.map(|turn| turn.participant_id),
            );
        }
        if let Some(turn) = decision.agent_turn {
            self.dispatch_agent_turn(turn);
        }
        decision
    }

    fn dispatch_agent_turn(&self, turn: AgentTurn) {
        let Some(request_id) = self
            .inner
            .gateway
            .begin(turn.session_id, turn.participant_id)
        else {
            return;
        };
        debug!(
            session_id = %turn.session_id,
            participant_id = %turn.participant_id,
            %request_id,
            "dispatching agent request"
        );
        let task = tokio::spawn(self.clone().run_agent_turn(turn, request_id));
        self.inner
            .gateway
            .attach(turn.session_id, request_id, task.abort_handle());
    }

    fn run_agent_turn(
        self,
        turn: AgentTurn,
        request_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if let Err(e) = self.agent_turn(turn, request_id).await {
                error!(
                    session_id = %turn.session_id,
                    participant_id = %turn.participant_id,
                    %request_id,
                    error = %e,
                    "agent turn failed"
                );
            }
        })
    }

    async fn agent_turn(&self, turn: AgentTurn, request_id: Uuid) -> Result<(), DomainError> {
        let gateway = &self.inner.gateway;
        let context = self
            .inner
            .arbiter
            .agent_context(turn.session_id, turn.participant_id)
            .await;
        let context = match context {
            Ok(Some(context)) => context,
            Ok(None) => {
                gateway.finish(turn.session_id, request_id);
                return Ok(());
            }
            Err(e) => {
                gateway.finish(turn.session_id, request_id);
                return Err(e);
            }
        };

        let reply = gateway.request(&context).await;
        if !gateway.finish(turn.session_id, request_id) {
            debug!(session_id = %turn.session_id, %request_id, "discarding superseded agent reply");
            return Ok(());
        }

        let fallback = match reply {
            AgentReply::Action(action) => {
                let outcome = self
                    .propose_action(
                        turn.session_id,
                        turn.participant_id,
                        action,
                        agent_token(request_id),
                    )
                    .await?;
                match outcome.rejection() {
                    Some(RejectionReason::MalformedAction { detail }) => {
                        warn!(
                            session_id = %turn.session_id,
                            participant_id = %turn.participant_id,
                            %detail,
                            "agent proposed a malformed action"
                        );
                        PassReason::AgentRejected
                    }
                    _ => return Ok(()),
                }
            }
            AgentReply::Timeout => PassReason::AgentTimeout,
            AgentReply::Failed(_) => PassReason::AgentError,
        };

        let outcome = self
            .propose_action(
                turn.session_id,
                turn.participant_id,
                ProposedAction::pass(Some(fallback.as_str())),
                fallback_token(request_id),
            )
            .await?;
        if let Some(reason) = outcome.rejection() {
            debug!(session_id = %turn.session_id, %reason, "fallback pass not admitted");
        }
        Ok(())
    }
}
