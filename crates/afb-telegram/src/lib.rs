//! Telegram adapter (teloxide).
//!
//! Implements the `afb-core` messaging, connection and identity ports over the
//! Bot API, and runs the update dispatcher.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, RequestError};

use tokio::time::sleep;
use tracing::{debug, info, warn};

pub mod handlers;
pub mod router;

use afb_core::{
    domain::{BotIdentity, ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::port::MessagingPort,
    ports::{Connector, IdentityPort},
    Result,
};

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message_id.0)
}

/// `RetryAfter` becomes a floodwait; everything else is an external failure.
pub fn map_request_error(e: RequestError) -> Error {
    match e {
        RequestError::RetryAfter(wait) => Error::RateLimited { wait },
        other => Error::External(format!("telegram error: {other}")),
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// One retry after the server-mandated wait, then give up.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(wait)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    debug!(wait_secs = wait.as_secs(), "telegram asked to retry later");
                    sleep(wait).await;
                }
                Err(other) => return Err(map_request_error(other)),
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    tg_chat(msg.chat_id),
                    tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(tg_chat(msg.chat_id), tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }
}

/// Bot API "connection": a `getMe` handshake that validates the token.
///
/// The Bot API is stateless, so `disconnect` only logs.
#[derive(Clone)]
pub struct TelegramConnector {
    bot: Bot,
}

impl TelegramConnector {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    async fn connect(&self) -> Result<()> {
        let me = self.bot.get_me().await.map_err(map_request_error)?;
        info!(username = %me.username(), "bot api token accepted");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("bot api session closed");
        Ok(())
    }
}

#[async_trait]
impl IdentityPort for TelegramConnector {
    async fn get_me(&self) -> Result<BotIdentity> {
        let me = self.bot.get_me().await.map_err(map_request_error)?;
        let username = me.username().to_string();
        if username.is_empty() {
            warn!("bot account has no username");
        }
        Ok(BotIdentity {
            id: UserId(me.user.id.0 as i64),
            username,
            first_name: me.user.first_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_after_maps_to_floodwait() {
        let err = map_request_error(RequestError::RetryAfter(Duration::from_secs(17)));
        assert_eq!(err.flood_wait(), Some(Duration::from_secs(17)));
    }

    #[test]
    fn other_errors_are_external() {
        let err = map_request_error(RequestError::Api(teloxide::ApiError::BotBlocked));
        assert!(matches!(err, Error::External(_)));
        assert!(err.flood_wait().is_none());
    }
}
