//! Hearth session: live session orchestration bounded context.
//!
//! Owns a running session's authoritative state: serializes proposals from
//! humans and AI agents, resolves turn order and timeline triggers, and
//! streams ordered deltas to subscribers.

pub mod application;
pub mod domain;

pub use application::config::OrchestratorConfig;
pub use application::orchestrator::SessionOrchestrator;
