use std::{collections::HashMap, sync::Arc};

use afb_core::{
    domain::{ChatId, IndexedMessage, MediaFile, MessageId},
    iter::MAX_BATCH,
    ports::MessageSource,
    Error, Result,
};
use async_trait::async_trait;
use grammers_tl_types as tl;
use tracing::debug;

use crate::{client::MtProtoClient, errors::map_invocation};

const CHANNEL_PREFIX: i64 = -1_000_000_000_000;

/// MTProto channel id for a Bot API chat id (`-100XXXX` → `XXXX`).
pub fn channel_id_of(chat_id: ChatId) -> Option<i64> {
    (chat_id.0 < CHANNEL_PREFIX).then(|| CHANNEL_PREFIX - chat_id.0)
}

/// `MessageSource` over `channels.getMessages` (channels) and
/// `messages.getMessages` (everything else).
pub struct MtProtoSource {
    client: Arc<MtProtoClient>,
    access_hashes: HashMap<i64, i64>,
}

impl MtProtoSource {
    pub fn new(client: Arc<MtProtoClient>, access_hashes: HashMap<i64, i64>) -> Self {
        Self {
            client,
            access_hashes,
        }
    }
}

#[async_trait]
impl MessageSource for MtProtoSource {
    async fn fetch(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<Vec<IndexedMessage>> {
        if ids.len() as i64 > MAX_BATCH {
            return Err(Error::External(format!(
                "at most {MAX_BATCH} ids per fetch, got {}",
                ids.len()
            )));
        }
        let client = self.client.client()?;
        let id: Vec<tl::enums::InputMessage> = ids
            .iter()
            .map(|m| tl::enums::InputMessage::Id(tl::types::InputMessageId { id: m.0 }))
            .collect();

        let result = match channel_id_of(chat_id) {
            Some(channel_id) => {
                let access_hash = self.access_hashes.get(&chat_id.0).copied().unwrap_or(0);
                client
                    .invoke(&tl::functions::channels::GetMessages {
                        channel: tl::enums::InputChannel::Channel(tl::types::InputChannel {
                            channel_id,
                            access_hash,
                        }),
                        id,
                    })
                    .await
            }
            None => client.invoke(&tl::functions::messages::GetMessages { id }).await,
        }
        .map_err(map_invocation)?;

        let messages = match result {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(m) => m.messages,
            tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };
        debug!(
            chat_id = chat_id.0,
            requested = ids.len(),
            returned = messages.len(),
            "fetched batch"
        );

        Ok(messages
            .into_iter()
            .map(|m| to_indexed(chat_id, m))
            .collect())
    }
}

fn to_indexed(chat_id: ChatId, message: tl::enums::Message) -> IndexedMessage {
    match message {
        tl::enums::Message::Empty(m) => IndexedMessage::empty(chat_id, MessageId(m.id)),
        tl::enums::Message::Service(m) => IndexedMessage {
            id: MessageId(m.id),
            chat_id,
            text: None,
            media: None,
            empty: false,
        },
        tl::enums::Message::Message(m) => {
            let id = MessageId(m.id);
            let text = (!m.message.is_empty()).then(|| m.message.clone());
            let media = m
                .media
                .as_ref()
                .and_then(|media| document_file(chat_id, id, media, text.clone()));
            IndexedMessage {
                id,
                chat_id,
                text,
                media,
                empty: false,
            }
        }
    }
}

/// Documents with a file name become indexable media; photos and the rest do not.
fn document_file(
    chat_id: ChatId,
    message_id: MessageId,
    media: &tl::enums::MessageMedia,
    caption: Option<String>,
) -> Option<MediaFile> {
    let tl::enums::MessageMedia::Document(doc_media) = media else {
        return None;
    };
    let Some(tl::enums::Document::Document(doc)) = &doc_media.document else {
        return None;
    };
    let file_name = doc.attributes.iter().find_map(|attr| match attr {
        tl::enums::DocumentAttribute::Filename(f) => Some(f.file_name.clone()),
        _ => None,
    })?;

    Some(MediaFile {
        file_id: doc.id.to_string(),
        file_name,
        file_size: doc.size,
        mime_type: (!doc.mime_type.is_empty()).then(|| doc.mime_type.clone()),
        caption,
        chat_id,
        message_id,
    })
}
