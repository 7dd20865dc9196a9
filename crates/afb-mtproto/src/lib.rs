//! MTProto side of the bot (grammers): bulk message fetch for indexing.
//!
//! The Bot API cannot read a channel's history, so indexing goes through a
//! bot-authorized MTProto session.

mod client;
mod errors;
mod source;

pub use client::{MtProtoClient, MtProtoSettings};
pub use errors::{flood_wait_of, map_invocation};
pub use source::{channel_id_of, MtProtoSource};
