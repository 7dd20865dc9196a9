//! Core domain + application logic for the auto-filter bot.
//!
//! Framework-agnostic: Telegram (Bot API and MTProto), the database and the
//! HTTP listener live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod indexer;
pub mod iter;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod session;
pub mod supervise;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
