//! Hexagonal ports the core drives. Adapter crates implement them over
//! teloxide, grammers, rusqlite and axum; tests implement them with fakes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{BannedSets, BotIdentity, ChatId, IndexedMessage, MediaFile, MessageId},
    session::SessionContext,
    Result,
};

/// The connection to the messaging backend.
///
/// `connect` reports a floodwait as `Error::RateLimited { wait }`; every other
/// error is treated as fatal by the caller.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
}

/// Resolves the bot's own account.
#[async_trait]
pub trait IdentityPort: Send + Sync {
    async fn get_me(&self) -> Result<BotIdentity>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Duplicate,
}

/// The document store behind the bot.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_banned(&self) -> Result<BannedSets>;
    /// Liveness probe. Callers treat a failure as fatal.
    async fn ping(&self) -> Result<()>;
    /// Create the media collection indexes. Idempotent.
    async fn ensure_indexes(&self) -> Result<()>;
    async fn save_media(&self, file: &MediaFile) -> Result<SaveOutcome>;
    async fn search_media(&self, query: &str, limit: usize) -> Result<Vec<MediaFile>>;
    async fn count_media(&self) -> Result<u64>;
}

/// Bulk fetch of messages by id.
///
/// Implementations accept at most [`crate::iter::MAX_BATCH`] ids per call and
/// return one item per position they could resolve, empty slots included.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<IndexedMessage>>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// A long-running secondary service (the HTTP listener) started once the
/// session context exists.
#[async_trait]
pub trait Listener: Send + Sync {
    fn name(&self) -> &'static str;
    async fn serve(self: Arc<Self>, ctx: Arc<SessionContext>) -> Result<()>;
}
