//! Telegram update handlers.
//!
//! Every message passes the banned-set filter first; commands go to
//! [`commands`], any other text is treated as a file search. Channel posts
//! from the watched channels are indexed as they arrive.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use afb_core::domain::{ChatId, UserId};

use crate::router::AppState;

mod channel;
mod commands;
mod search;

pub use channel::handle_channel_post;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if state.ctx.is_blocked(user_id, chat_id) {
        debug!(chat_id = chat_id.0, user_id = ?user_id.map(|u| u.0), "ignoring banned sender");
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }

    search::handle_search(msg, state).await
}
