//! Proposed actions as they arrive from clients or the agent responder.

use serde::{Deserialize, Serialize};

/// An action a participant wants admitted into the session.
///
/// `payload` is interpreted according to `kind` by the session state
/// machine; structural validation happens at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Action kind, e.g. `"attack"`, `"chat"`, `"pass"`.
    pub kind: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ProposedAction {
    /// Creates an action of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// A `pass` action, optionally tagged with why the turn was passed.
    #[must_use]
    pub fn pass(reason: Option<&str>) -> Self {
        let payload = match reason {
            Some(reason) => serde_json::json!({ "reason": reason }),
            None => serde_json::json!({}),
        };
        Self::new("pass", payload)
    }
}
