use std::collections::HashSet;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, Bot API form: channels are `-100…`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// The bot's own identity, resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
}

impl BotIdentity {
    /// `@username` form used in logs and replies.
    pub fn handle(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Banned users and chats, loaded from the store at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BannedSets {
    pub users: HashSet<i64>,
    pub chats: HashSet<i64>,
}

impl BannedSets {
    pub fn is_user_banned(&self, user_id: UserId) -> bool {
        self.users.contains(&user_id.0)
    }

    pub fn is_chat_banned(&self, chat_id: ChatId) -> bool {
        self.chats.contains(&chat_id.0)
    }
}

/// A media file as stored in the media collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaFile {
    pub file_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MediaFile {
    /// Lower-cased extension of `file_name`, if any.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

/// One position of a chat's message-id space, as returned by a batch fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub text: Option<String>,
    pub media: Option<MediaFile>,
    /// The id did not resolve to a message (deleted or never existed).
    pub empty: bool,
}

impl IndexedMessage {
    pub fn empty(chat_id: ChatId, id: MessageId) -> Self {
        Self {
            id,
            chat_id,
            text: None,
            media: None,
            empty: true,
        }
    }
}
