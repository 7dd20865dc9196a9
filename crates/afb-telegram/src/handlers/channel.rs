use std::sync::Arc;

use teloxide::{prelude::*, types::FileMeta};
use tracing::warn;

use afb_core::{
    domain::{ChatId, MediaFile, MessageId},
    indexer::index_post,
};

use crate::router::AppState;

/// The file parts of a document, video or audio attachment.
struct Attachment<'a> {
    file: &'a FileMeta,
    file_name: Option<&'a str>,
    mime_type: Option<String>,
}

fn attachment(msg: &Message) -> Option<Attachment<'_>> {
    if let Some(d) = msg.document() {
        return Some(Attachment {
            file: &d.file,
            file_name: d.file_name.as_deref(),
            mime_type: d.mime_type.as_ref().map(|m| m.to_string()),
        });
    }
    if let Some(v) = msg.video() {
        return Some(Attachment {
            file: &v.file,
            file_name: v.file_name.as_deref(),
            mime_type: v.mime_type.as_ref().map(|m| m.to_string()),
        });
    }
    msg.audio().map(|a| Attachment {
        file: &a.file,
        file_name: a.file_name.as_deref(),
        mime_type: a.mime_type.as_ref().map(|m| m.to_string()),
    })
}

/// Files without a name cannot be searched, so they are not indexed.
fn media_file(
    chat_id: ChatId,
    message_id: MessageId,
    file_id: &str,
    file_name: Option<&str>,
    file_size: u32,
    mime_type: Option<String>,
    caption: Option<&str>,
) -> Option<MediaFile> {
    let file_name = file_name.map(str::trim).filter(|n| !n.is_empty())?;
    Some(MediaFile {
        file_id: file_id.to_string(),
        file_name: file_name.to_string(),
        file_size: i64::from(file_size),
        mime_type,
        caption: caption.map(str::to_string),
        chat_id,
        message_id,
    })
}

pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let file = attachment(&msg).and_then(|a| {
        media_file(
            chat_id,
            MessageId(msg.id.0),
            &a.file.id,
            a.file_name,
            a.file.size,
            a.mime_type,
            msg.caption(),
        )
    });

    if let Err(e) = index_post(
        state.store.as_ref(),
        &state.cfg.index_channels,
        &state.cfg.index_extensions,
        chat_id,
        file.as_ref(),
    )
    .await
    {
        warn!(chat_id = chat_id.0, message_id = msg.id.0, err = %e, "could not index channel post");
    }
    Ok(())
}
