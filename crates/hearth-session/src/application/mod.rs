//! Application services wiring the session domain to storage, the agent
//! responder and subscribers.

pub mod arbiter;
pub mod broadcaster;
pub mod config;
pub mod gateway;
pub mod orchestrator;
pub mod query_handlers;
pub(crate) mod registry;
