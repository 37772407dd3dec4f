//! Commands addressed to a single event stream.

use uuid::Uuid;

/// A request to change one aggregate.
///
/// Commands are serialized per aggregate: two commands with the same
/// `aggregate_id` never decide concurrently.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// Stable name used in logs, e.g. `"session.propose_action"`.
    fn command_type(&self) -> &'static str;

    /// Correlation ID copied onto every event the command produces.
    fn correlation_id(&self) -> Uuid;

    /// The stream the command is decided against.
    fn aggregate_id(&self) -> Uuid;
}
