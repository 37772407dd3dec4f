//! Shared application state.

use hearth_session::SessionOrchestrator;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The live session engine.
    pub orchestrator: SessionOrchestrator,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self { orchestrator }
    }
}
