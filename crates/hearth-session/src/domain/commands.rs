//! Commands for the session context.

use hearth_core::action::ProposedAction;
use hearth_core::command::Command;
use uuid::Uuid;

/// Command to open a pending session for a campaign.
#[derive(Debug, Clone)]
pub struct OpenSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier for the new session.
    pub session_id: Uuid,
    /// The campaign to play.
    pub campaign_id: Uuid,
}

impl Command for OpenSession {
    fn command_type(&self) -> &'static str {
        "session.open"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to add a roster participant to the turn rotation.
#[derive(Debug, Clone)]
pub struct JoinSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
    /// The joining participant.
    pub participant_id: Uuid,
}

impl Command for JoinSession {
    fn command_type(&self) -> &'static str {
        "session.join"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to start a pending session.
#[derive(Debug, Clone)]
pub struct BeginSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
}

impl Command for BeginSession {
    fn command_type(&self) -> &'static str {
        "session.begin"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command proposing an action on behalf of a participant.
#[derive(Debug, Clone)]
pub struct ProposeAction {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
    /// The proposing participant.
    pub participant_id: Uuid,
    /// The proposed action.
    pub action: ProposedAction,
    /// Client-supplied key making retries safe.
    pub idempotency_token: String,
}

impl Command for ProposeAction {
    fn command_type(&self) -> &'static str {
        "session.propose_action"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to pause an active session.
#[derive(Debug, Clone)]
pub struct PauseSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
}

impl Command for PauseSession {
    fn command_type(&self) -> &'static str {
        "session.pause"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to resume a paused session.
#[derive(Debug, Clone)]
pub struct ResumeSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
}

impl Command for ResumeSession {
    fn command_type(&self) -> &'static str {
        "session.resume"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to complete a session.
#[derive(Debug, Clone)]
pub struct CompleteSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
    /// Optional reason recorded with the completion.
    pub reason: Option<String>,
}

impl Command for CompleteSession {
    fn command_type(&self) -> &'static str {
        "session.complete"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command removing a participant from the turn rotation.
#[derive(Debug, Clone)]
pub struct LeaveSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session identifier.
    pub session_id: Uuid,
    /// The leaving participant.
    pub participant_id: Uuid,
}

impl Command for LeaveSession {
    fn command_type(&self) -> &'static str {
        "session.leave"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.session_id
    }
}
