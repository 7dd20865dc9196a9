//! In-memory fakes of the ports, shared by the unit tests of this crate.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{
        BannedSets, BotIdentity, ChatId, IndexedMessage, MediaFile, MessageId, MessageRef, UserId,
    },
    messaging::port::MessagingPort,
    ports::{Connector, IdentityPort, Listener, MessageSource, SaveOutcome, Sleeper, Store},
    session::SessionContext,
    Error, Result,
};

/// Ordered log of calls across several fakes.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ============== Connector ==============

#[derive(Default)]
pub struct FakeConnector {
    pub floods: Mutex<VecDeque<Duration>>,
    pub failure: Option<String>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub journal: Journal,
}

impl FakeConnector {
    pub fn flooding(waits: Vec<Duration>) -> Self {
        Self {
            floods: Mutex::new(waits.into()),
            ..Default::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.journal.push("connect");
        if let Some(reason) = &self.failure {
            return Err(Error::External(reason.clone()));
        }
        match self.floods.lock().unwrap().pop_front() {
            Some(wait) => Err(Error::RateLimited { wait }),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.journal.push("disconnect");
        Ok(())
    }
}

// ============== Sleeper ==============

#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        self.slept.lock().unwrap().push(d);
    }
}

// ============== Messenger ==============

#[derive(Default)]
pub struct FakeMessenger {
    pub next_id: Mutex<i32>,
    pub sends: Mutex<Vec<(ChatId, String)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deletes: Mutex<Vec<MessageRef>>,
    pub failing_chats: HashSet<i64>,
    pub fail_edits: bool,
    pub fail_deletes: bool,
    pub journal: Journal,
}

impl FakeMessenger {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn failing_sends_to(mut self, chat_id: ChatId) -> Self {
        self.failing_chats.insert(chat_id.0);
        self
    }

    pub fn failing_edits(mut self) -> Self {
        self.fail_edits = true;
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn sends(&self) -> Vec<(ChatId, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_to(&self) -> Vec<ChatId> {
        self.sends().into_iter().map(|(c, _)| c).collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.journal.push(format!("send {}", chat_id.0));
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        if self.failing_chats.contains(&chat_id.0) {
            return Err(Error::External(
                "Forbidden: bot can't initiate conversation with a user".to_string(),
            ));
        }
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.journal.push(format!("edit {} {}", msg.chat_id.0, msg.message_id.0));
        self.edits.lock().unwrap().push((msg, html.to_string()));
        if self.fail_edits {
            return Err(Error::External("Bad Request: message to edit not found".to_string()));
        }
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.journal.push(format!("delete {}", msg.chat_id.0));
        self.deletes.lock().unwrap().push(msg);
        if self.fail_deletes {
            return Err(Error::External(
                "Bad Request: message can't be deleted".to_string(),
            ));
        }
        Ok(())
    }
}

// ============== Store ==============

#[derive(Default)]
pub struct FakeStore {
    pub banned: BannedSets,
    pub ping_error: Option<String>,
    pub media: Mutex<Vec<MediaFile>>,
    pub journal: Journal,
}

impl FakeStore {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn media(&self) -> Vec<MediaFile> {
        self.media.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn load_banned(&self) -> Result<BannedSets> {
        self.journal.push("load_banned");
        Ok(self.banned.clone())
    }

    async fn ping(&self) -> Result<()> {
        self.journal.push("ping");
        match &self.ping_error {
            Some(reason) => Err(Error::DependencyUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.journal.push("ensure_indexes");
        Ok(())
    }

    async fn save_media(&self, file: &MediaFile) -> Result<SaveOutcome> {
        let mut media = self.media.lock().unwrap();
        if media.iter().any(|m| m.file_id == file.file_id) {
            return Ok(SaveOutcome::Duplicate);
        }
        media.push(file.clone());
        Ok(SaveOutcome::Saved)
    }

    async fn search_media(&self, query: &str, limit: usize) -> Result<Vec<MediaFile>> {
        let q = query.to_lowercase();
        Ok(self
            .media
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.file_name.to_lowercase().contains(&q))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_media(&self) -> Result<u64> {
        Ok(self.media.lock().unwrap().len() as u64)
    }
}

// ============== Identity ==============

pub fn test_identity() -> BotIdentity {
    BotIdentity {
        id: UserId(777),
        username: "autofilter_bot".to_string(),
        first_name: "Auto Filter".to_string(),
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    pub journal: Journal,
}

impl FakeIdentity {
    pub fn with_journal(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl IdentityPort for FakeIdentity {
    async fn get_me(&self) -> Result<BotIdentity> {
        self.journal.push("get_me");
        Ok(test_identity())
    }
}

// ============== Listener ==============

#[derive(Default)]
pub struct FakeListener {
    pub fail_with: Option<String>,
    pub started: AtomicBool,
}

impl FakeListener {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listener for FakeListener {
    fn name(&self) -> &'static str {
        "fake-listener"
    }

    async fn serve(self: Arc<Self>, _ctx: Arc<SessionContext>) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        if let Some(reason) = &self.fail_with {
            return Err(Error::External(reason.clone()));
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ============== Message source ==============

/// Answers every id with a message carrying an `.mkv` document, recording batch sizes.
#[derive(Default)]
pub struct FakeSource {
    pub calls: Mutex<Vec<usize>>,
    /// Zero-based call index that returns an error.
    pub fail_on_call: Option<usize>,
    /// Return one item fewer than requested.
    pub drop_last: bool,
    /// Ids that resolve to empty slots.
    pub empty_ids: HashSet<i32>,
    /// Ids that resolve to text-only messages.
    pub text_ids: HashSet<i32>,
}

impl FakeSource {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    pub fn message(&self, chat_id: ChatId, id: MessageId) -> IndexedMessage {
        if self.empty_ids.contains(&id.0) {
            return IndexedMessage::empty(chat_id, id);
        }
        if self.text_ids.contains(&id.0) {
            return IndexedMessage {
                id,
                chat_id,
                text: Some(format!("hello {}", id.0)),
                media: None,
                empty: false,
            };
        }
        IndexedMessage {
            id,
            chat_id,
            text: None,
            media: Some(MediaFile {
                file_id: format!("doc-{}", id.0),
                file_name: format!("Movie.Part.{}.mkv", id.0),
                file_size: 1_024,
                mime_type: Some("video/x-matroska".to_string()),
                caption: None,
                chat_id,
                message_id: id,
            }),
            empty: false,
        }
    }
}

#[async_trait]
impl MessageSource for FakeSource {
    async fn fetch(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<IndexedMessage>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ids.len());
            calls.len() - 1
        };
        if self.fail_on_call == Some(call) {
            return Err(Error::External("FLOOD_WAIT or network failure".to_string()));
        }
        let mut out: Vec<IndexedMessage> =
            ids.iter().map(|&id| self.message(chat_id, id)).collect();
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }
}
