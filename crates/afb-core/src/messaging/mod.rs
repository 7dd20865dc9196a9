//! Outbound messaging: the port the bot talks through and its decorators.

pub mod port;
pub mod throttled;
pub mod types;
