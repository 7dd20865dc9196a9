use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    domain::{BannedSets, BotIdentity, ChatId, UserId},
    messaging::port::MessagingPort,
    utils::get_readable_time,
};

/// Read-only facts about the running session.
///
/// Built once at the end of hydration and handed to every consumer
/// (update handlers, HTTP listener) as an `Arc`. Nothing mutates it afterwards.
#[derive(Clone)]
pub struct SessionContext {
    pub started_at: DateTime<Utc>,
    pub banned: BannedSets,
    pub me: BotIdentity,
    pub messenger: Arc<dyn MessagingPort>,
}

impl SessionContext {
    pub fn uptime_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn uptime(&self) -> Duration {
        self.uptime_at(Utc::now())
    }

    pub fn readable_uptime(&self) -> String {
        get_readable_time(self.uptime())
    }

    /// Whether an update from this user in this chat should be ignored.
    pub fn is_blocked(&self, user_id: Option<UserId>, chat_id: ChatId) -> bool {
        self.banned.is_chat_banned(chat_id)
            || user_id.is_some_and(|u| self.banned.is_user_banned(u))
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("started_at", &self.started_at)
            .field("banned", &self.banned)
            .field("me", &self.me)
            .finish_non_exhaustive()
    }
}
