//! Session domain: events, the pure state fold, and the aggregate.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod intent;
pub mod outcome;
pub mod state;
