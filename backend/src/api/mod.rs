//! API handlers.

pub mod messages;
pub mod sse;
