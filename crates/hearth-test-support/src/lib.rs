//! Shared test doubles and utilities for the Hearth session orchestrator.

mod agent;
mod campaign;
mod clock;
mod repository;

pub use agent::{FailingAgentResponder, ScriptedAgentResponder, SilentAgentResponder};
pub use campaign::{FailingCampaignDirectory, StaticCampaignDirectory, ai_agent, human};
pub use clock::{FixedClock, fixed_time};
pub use repository::{FailingEventRepository, InMemoryEventRepository, StallingEventRepository};
