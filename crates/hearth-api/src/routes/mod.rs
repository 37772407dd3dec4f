//! HTTP and WebSocket routes.

pub mod health;
pub mod session;
pub mod subscribe;
