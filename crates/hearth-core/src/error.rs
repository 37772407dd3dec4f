//! Errors shared across bounded contexts.

use thiserror::Error;
use uuid::Uuid;

/// Failure of a lookup, a write, or an outbound collaborator.
///
/// A session refusing a request is not a failure; those refusals are
/// returned as outcomes by the session context.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No stream or campaign exists under this id.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// Another writer appended to the stream first.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The contended stream.
        aggregate_id: Uuid,
        /// Stream head the writer decided against.
        expected: i64,
        /// Stream head found at append time.
        actual: i64,
    },

    /// Input that cannot be acted on, such as a campaign with no roster.
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage, encoding, or collaborator failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Infrastructure(format!("event serialization failed: {err}"))
    }
}
