//! Shared domain abstractions for Hearth.
//!
//! Traits and types the session orchestrator and its adapters depend on:
//! event-sourcing primitives, the clock, and the ports to the two outbound
//! collaborators (campaign directory and agent responder). No
//! infrastructure code lives here.

pub mod action;
pub mod agent;
pub mod aggregate;
pub mod campaign;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod repository;
