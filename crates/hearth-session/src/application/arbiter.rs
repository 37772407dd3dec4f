//! Turn and action arbitration.
//!
//! Every command for a session runs under that session's lock: decide
//! against the folded state, append the staged events atomically, fold
//! them in, then publish. Rejections write nothing.

use std::sync::Arc;

use hearth_core::aggregate::AggregateRoot;
use hearth_core::agent::AgentContext;
use hearth_core::campaign::{Participant, TimelineEvent};
use hearth_core::clock::Clock;
use hearth_core::command::Command;
use hearth_core::error::DomainError;
use hearth_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broadcaster::{SessionBroadcaster, Subscription};
use super::query_handlers::{SessionEventView, SessionView};
use super::registry::{SessionCore, SessionRegistry};
use crate::domain::aggregates::Session;
use crate::domain::commands::{
    BeginSession, CompleteSession, JoinSession, LeaveSession, OpenSession, PauseSession,
    ProposeAction, ResumeSession,
};
use crate::domain::events::SessionEvent;
use crate::domain::intent::{ActionIntent, is_proposer_agnostic};
use crate::domain::outcome::{Admission, Outcome, RejectionReason};
use crate::domain::state::{SessionState, SessionStatus};

/// How a proposal is answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Structurally valid and permitted; admit it.
    Admit(ActionIntent),
    /// The token was already admitted; answer with the original outcome.
    Replay(Outcome),
    /// Refuse it.
    Reject(RejectionReason),
}

/// Judges a proposal against the current state. Pure.
///
/// Checks run in a fixed order: token replay, session status, rotation
/// membership, turn ownership, then payload validity. Replay comes before
/// the status checks on purpose: a client retrying an admitted proposal
/// after the session paused or completed still gets its original outcome.
#[must_use]
pub fn evaluate_proposal(state: &SessionState, command: &ProposeAction) -> Verdict {
    if command.idempotency_token.trim().is_empty() {
        return Verdict::Reject(RejectionReason::malformed(
            "idempotency token must not be empty",
        ));
    }
    if let Some(admission) = state.admitted_tokens.get(&command.idempotency_token) {
        return Verdict::Replay(Outcome::Admitted(*admission));
    }
    match state.status {
        SessionStatus::Completed => return Verdict::Reject(RejectionReason::SessionClosed),
        SessionStatus::Pending | SessionStatus::Paused => {
            return Verdict::Reject(RejectionReason::SessionNotActive);
        }
        SessionStatus::Active => {}
    }
    if !state.has_joined(command.participant_id) {
        return Verdict::Reject(RejectionReason::NotAParticipant);
    }
    if !is_proposer_agnostic(&command.action.kind)
        && state.active_participant != Some(command.participant_id)
    {
        return Verdict::Reject(RejectionReason::NotYourTurn);
    }
    match ActionIntent::parse(&command.action) {
        Ok(intent) => Verdict::Admit(intent),
        Err(detail) => Verdict::Reject(RejectionReason::malformed(detail)),
    }
}

/// An AI agent that needs to be asked for its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTurn {
    /// The session.
    pub session_id: Uuid,
    /// The agent holding the turn.
    pub participant_id: Uuid,
}

/// Result of one arbitrated command.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Admission or rejection.
    pub outcome: Outcome,
    /// Session view after the command.
    pub view: SessionView,
    /// Set when an AI agent holds the turn after this command.
    pub agent_turn: Option<AgentTurn>,
}

enum Ruling {
    /// Events are staged on the aggregate and must be appended.
    Staged,
    /// Answered without writing.
    Settled(Outcome),
}

impl From<Result<(), RejectionReason>> for Ruling {
    fn from(result: Result<(), RejectionReason>) -> Self {
        match result {
            Ok(()) => Self::Staged,
            Err(reason) => Self::Settled(Outcome::rejected(reason)),
        }
    }
}

fn stage_creation(
    session: &mut Session,
    command: &OpenSession,
    roster: Vec<Participant>,
    timeline: Vec<TimelineEvent>,
    start: bool,
    clock: &dyn Clock,
) -> Result<(), RejectionReason> {
    let joining: Vec<Uuid> = roster.iter().map(|p| p.id).collect();
    session.open(
        command.campaign_id,
        roster,
        timeline,
        command.correlation_id,
        clock,
    )?;
    if start {
        for participant_id in joining {
            session.join(participant_id, command.correlation_id, clock)?;
        }
        session.begin(command.correlation_id, clock)?;
    }
    Ok(())
}

/// Serializes commands per session and owns the live registry.
pub struct Arbiter {
    registry: SessionRegistry,
    repository: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    broadcaster: SessionBroadcaster,
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("broadcaster", &self.broadcaster)
            .finish_non_exhaustive()
    }
}

impl Arbiter {
    /// Creates an arbiter. `context_window` bounds the recent events kept
    /// per session for agent contexts.
    #[must_use]
    pub fn new(
        repository: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        broadcaster: SessionBroadcaster,
        context_window: usize,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(context_window),
            repository,
            clock,
            broadcaster,
        }
    }

    /// The broadcaster deltas are published to.
    #[must_use]
    pub fn broadcaster(&self) -> &SessionBroadcaster {
        &self.broadcaster
    }

    /// Creates a new session stream, optionally joining the whole roster
    /// and starting it in the same append.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the append fails.
    pub async fn create(
        &self,
        command: &OpenSession,
        roster: Vec<Participant>,
        timeline: Vec<TimelineEvent>,
        start: bool,
    ) -> Result<Decision, DomainError> {
        let mut core = self.registry.core_for(Session::new(command.session_id));
        let ruling = Ruling::from(stage_creation(
            &mut core.session,
            command,
            roster,
            timeline,
            start,
            self.clock.as_ref(),
        ));
        let decision = self.settle(&mut core, ruling).await?;
        if decision.outcome.is_admitted() && decision.view.status != SessionStatus::Completed {
            self.registry.insert(core).await;
        }
        Ok(decision)
    }

    /// Adds a participant to the rotation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn join(&self, command: &JoinSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session
                .join(command.participant_id, command.correlation_id, clock)
                .into()
        })
        .await
    }

    /// Starts a pending session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn begin(&self, command: &BeginSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session.begin(command.correlation_id, clock).into()
        })
        .await
    }

    /// Arbitrates a proposed action.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn propose(&self, command: &ProposeAction) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            match evaluate_proposal(core.session.state(), command) {
                Verdict::Admit(intent) => {
                    core.session.accept_action(
                        command.participant_id,
                        command.idempotency_token.clone(),
                        command.action.clone(),
                        &intent,
                        &core.connected,
                        command.correlation_id,
                        clock,
                    );
                    Ruling::Staged
                }
                Verdict::Replay(outcome) => Ruling::Settled(outcome),
                Verdict::Reject(reason) => Ruling::Settled(Outcome::rejected(reason)),
            }
        })
        .await
    }

    /// Pauses an active session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn pause(&self, command: &PauseSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session.pause(command.correlation_id, clock).into()
        })
        .await
    }

    /// Resumes a paused session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn resume(&self, command: &ResumeSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session.resume(command.correlation_id, clock).into()
        })
        .await
    }

    /// Completes a session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn complete(&self, command: &CompleteSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session
                .complete(command.reason.clone(), command.correlation_id, clock)
                .into()
        })
        .await
    }

    /// Removes a participant from the rotation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or persisted.
    pub async fn leave(&self, command: &LeaveSession) -> Result<Decision, DomainError> {
        self.execute(command, |core, clock| {
            core.session
                .leave(
                    command.participant_id,
                    &core.connected,
                    command.correlation_id,
                    clock,
                )
                .into()
        })
        .await
    }

    /// Current view of a session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for unknown sessions.
    pub async fn view(
        &self,
        session_id: Uuid,
    ) -> Result<(SessionView, Option<AgentTurn>), DomainError> {
        let slot = self
            .registry
            .get_or_load(session_id, self.repository.as_ref())
            .await?;
        let mut core = slot.core.lock().await;
        self.ready(&mut core).await?;
        let agent_turn = Self::pending_agent_turn(&mut core, false);
        Ok((SessionView::from_state(slot.id, core.session.state()), agent_turn))
    }

    /// Builds the context for an agent request, provided the agent still
    /// holds the turn of an active session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the session cannot be loaded or the context
    /// does not serialize.
    pub async fn agent_context(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<AgentContext>, DomainError> {
        let slot = self
            .registry
            .get_or_load(session_id, self.repository.as_ref())
            .await?;
        let mut core = slot.core.lock().await;
        self.ready(&mut core).await?;
        let state = core.session.state();
        if !state.agent_holds_turn() || state.active_participant != Some(participant_id) {
            return Ok(None);
        }
        let snapshot = serde_json::to_value(SessionView::from_state(session_id, state))?;
        let recent_events = core
            .recent
            .iter()
            .map(|event| serde_json::to_value(SessionEventView::from(event)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(AgentContext {
            session_id,
            campaign_id: state.campaign_id.unwrap_or_default(),
            participant_id,
            turn_number: state.turn_number,
            snapshot,
            recent_events,
        }))
    }

    /// Opens a subscription. A participant subscription also marks that
    /// participant connected for as long as the broadcaster holds it: until
    /// it is unsubscribed, dropped for falling behind, or abandoned.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the participant is not on the
    /// roster, or `DomainError::AggregateNotFound` for unknown sessions.
    pub async fn subscribe(
        &self,
        session_id: Uuid,
        participant_id: Option<Uuid>,
    ) -> Result<(Subscription, Option<AgentTurn>), DomainError> {
        let slot = self
            .registry
            .get_or_load(session_id, self.repository.as_ref())
            .await?;
        let mut core = slot.core.lock().await;
        self.ready(&mut core).await?;
        if let Some(participant_id) = participant_id {
            if core.session.state().roster_entry(participant_id).is_none() {
                return Err(DomainError::Validation(format!(
                    "participant {participant_id} is not on the roster of session {session_id}"
                )));
            }
        }
        let view = SessionView::from_state(session_id, core.session.state());
        let completed = view.status == SessionStatus::Completed;
        let subscription = self.broadcaster.subscribe(session_id, participant_id, view);
        if completed {
            // Snapshot only; the stream ends right after it.
            self.broadcaster.unsubscribe(session_id, subscription.id);
            drop(core);
            self.registry.evict(session_id).await;
            return Ok((subscription, None));
        }
        if let Some(participant_id) = participant_id {
            core.connect(participant_id);
        }
        let agent_turn = Self::pending_agent_turn(&mut core, false);
        debug!(%session_id, subscription_id = %subscription.id, "subscription opened");
        Ok((subscription, agent_turn))
    }

    /// Closes a subscription and releases its presence. Presence is only
    /// released if the broadcaster still held the subscription; otherwise it
    /// was released when the subscription was dropped.
    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let session_id = subscription.session_id;
        let Some(slot) = self.registry.get(session_id).await else {
            self.broadcaster.unsubscribe(session_id, subscription.id);
            return;
        };
        let mut core = slot.core.lock().await;
        let registered = self.broadcaster.unsubscribe(session_id, subscription.id);
        if let (true, Some(participant_id)) = (registered, subscription.participant_id) {
            core.disconnect(participant_id);
        }
    }

    async fn execute<C, F>(&self, command: &C, decide: F) -> Result<Decision, DomainError>
    where
        C: Command,
        F: FnOnce(&mut SessionCore, &dyn Clock) -> Ruling + Send,
    {
        let session_id = command.aggregate_id();
        debug!(
            %session_id,
            command = command.command_type(),
            correlation_id = %command.correlation_id(),
            "arbitrating command"
        );
        let slot = self
            .registry
            .get_or_load(session_id, self.repository.as_ref())
            .await?;
        let mut core = slot.core.lock().await;
        self.ready(&mut core).await?;
        let ruling = decide(&mut core, self.clock.as_ref());
        self.settle(&mut core, ruling).await
    }

    /// Brings a locked session up to date before it is read or decided on.
    ///
    /// A command future dropped mid-append leaves its events staged and its
    /// append unconfirmed; neither may leak into the next command. Presence
    /// held by subscriptions dropped without an unsubscribe is released here
    /// too, so turn rotation never waits on them.
    async fn ready(&self, core: &mut SessionCore) -> Result<(), DomainError> {
        let session_id = core.session.id;
        if !core.session.uncommitted_events().is_empty() {
            debug!(%session_id, "discarding events staged by an abandoned command");
            core.session.take_uncommitted_events();
        }
        if core.in_doubt {
            self.catch_up(core).await?;
        }
        for participant_id in self.broadcaster.prune_closed(session_id) {
            core.disconnect(participant_id);
        }
        Ok(())
    }

    /// Replaces the in-memory session with the stored stream, publishing any
    /// events this process has not yet folded in.
    async fn catch_up(&self, core: &mut SessionCore) -> Result<(), DomainError> {
        let session_id = core.session.id;
        let known = core.session.version();
        let stored = self.repository.load_events(session_id).await?;
        let session = Session::reconstitute(session_id, &stored)?;
        let unseen = stored
            .iter()
            .filter(|e| e.sequence_number > known)
            .map(SessionEvent::from_stored)
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            %session_id,
            known,
            unseen = unseen.len(),
            "caught up session from event log"
        );
        core.session = session;
        core.in_doubt = false;
        for event in unseen {
            self.publish(core, event);
        }
        if core.session.state().status == SessionStatus::Completed {
            self.broadcaster.close(session_id);
            self.registry.evict(session_id).await;
        }
        Ok(())
    }

    fn publish(&self, core: &mut SessionCore, event: SessionEvent) {
        let fanout = self.broadcaster.publish(&event);
        for participant_id in fanout.released {
            core.disconnect(participant_id);
        }
        core.remember(event);
    }

    async fn settle(&self, core: &mut SessionCore, ruling: Ruling) -> Result<Decision, DomainError> {
        let session_id = core.session.id;
        let (outcome, persisted) = match ruling {
            Ruling::Settled(outcome) => {
                core.session.take_uncommitted_events();
                (outcome, false)
            }
            Ruling::Staged => (self.persist(core).await?, true),
        };
        if let Some(reason) = outcome.rejection() {
            debug!(%session_id, %reason, "request rejected");
        }

        let agent_turn = Self::pending_agent_turn(core, outcome.is_admitted());
        let view = SessionView::from_state(session_id, core.session.state());
        if persisted && view.status == SessionStatus::Completed {
            self.broadcaster.close(session_id);
            self.registry.evict(session_id).await;
            info!(%session_id, "session completed");
        }
        Ok(Decision {
            outcome,
            view,
            agent_turn,
        })
    }

    async fn persist(&self, core: &mut SessionCore) -> Result<Outcome, DomainError> {
        let session_id = core.session.id;
        let staged: Result<Vec<StoredEvent>, DomainError> = core
            .session
            .uncommitted_events()
            .iter()
            .map(SessionEvent::to_stored)
            .collect();
        let stored = match staged {
            Ok(stored) => stored,
            Err(e) => {
                core.session.take_uncommitted_events();
                return Err(e);
            }
        };
        let Some(first) = stored.first() else {
            return Err(DomainError::Infrastructure(format!(
                "no events staged for session {session_id}"
            )));
        };
        let admission = Admission {
            event_id: first.event_id,
            sequence_number: first.sequence_number,
        };

        let expected_version = core.session.version();
        // Cleared only once the append's result is known. A failed append
        // may still have landed, so it stays set until the next catch-up.
        core.in_doubt = true;
        if let Err(e) = self
            .repository
            .append_events(session_id, expected_version, &stored)
            .await
        {
            core.session.take_uncommitted_events();
            warn!(%session_id, expected_version, error = %e, "event append failed");
            if matches!(e, DomainError::ConcurrencyConflict { .. }) {
                self.reload(core).await;
            }
            return Err(e);
        }
        core.in_doubt = false;

        for event in core.session.commit() {
            self.publish(core, event);
        }
        Ok(Outcome::Admitted(admission))
    }

    /// Catches up after another writer got ahead of this session.
    async fn reload(&self, core: &mut SessionCore) {
        let session_id = core.session.id;
        if let Err(e) = self.catch_up(core).await {
            warn!(%session_id, error = %e, "reload failed, evicting session");
            self.registry.evict(session_id).await;
        }
    }

    fn pending_agent_turn(core: &mut SessionCore, admitted: bool) -> Option<AgentTurn> {
        let recovered = std::mem::take(&mut core.recovered);
        if !admitted && !recovered {
            return None;
        }
        let state = core.session.state();
        if !state.agent_holds_turn() {
            return None;
        }
        state.active_participant.map(|participant_id| AgentTurn {
            session_id: core.session.id,
            participant_id,
        })
    }
}
