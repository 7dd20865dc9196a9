//! Bulk indexing of a channel's media into the store.

use futures::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    domain::{ChatId, MediaFile},
    iter::{iter_messages, MAX_BATCH},
    ports::{MessageSource, SaveOutcome, Store},
    Result,
};

/// Counters for one `index_chat` run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub fetched: u64,
    pub saved: u64,
    pub duplicates: u64,
    /// Deleted or never-existing ids.
    pub empty: u64,
    /// Text-only messages and files with an extension not in the allow list.
    pub unsupported: u64,
    /// Position to pass as `offset` to resume.
    pub last_offset: i64,
    pub cancelled: bool,
}

impl IndexReport {
    pub fn summary(&self) -> String {
        format!(
            "Saved {} files. Duplicates skipped: {}. Deleted messages skipped: {}. \
             Non-media or unsupported skipped: {}.",
            self.saved, self.duplicates, self.empty, self.unsupported
        )
    }
}

/// Walk `chat_id` from `offset` up to `limit` and save every media file whose
/// extension is in `extensions` (lower-case, no dot).
///
/// A fetch or store error ends the run and is returned; the counters logged so
/// far tell where it stopped. Cancellation is checked between messages and
/// returns the partial report with `cancelled` set.
pub async fn index_chat<S>(
    source: &S,
    store: &dyn Store,
    chat_id: ChatId,
    limit: i64,
    offset: i64,
    extensions: &[String],
    cancel: &CancellationToken,
) -> Result<IndexReport>
where
    S: MessageSource + ?Sized,
{
    let mut report = IndexReport {
        last_offset: offset,
        ..Default::default()
    };
    info!(chat_id = chat_id.0, offset, limit, "indexing started");

    let messages = iter_messages(source, chat_id, limit, offset);
    pin_mut!(messages);

    while let Some(item) = messages.next().await {
        if cancel.is_cancelled() {
            report.cancelled = true;
            info!(chat_id = chat_id.0, resume_from = report.last_offset, "indexing cancelled");
            return Ok(report);
        }

        let msg = item?;
        report.fetched += 1;
        report.last_offset += 1;

        if msg.empty {
            report.empty += 1;
        } else {
            match msg.media {
                Some(file) if accepts(extensions, file.extension().as_deref()) => {
                    match store.save_media(&file).await? {
                        SaveOutcome::Saved => report.saved += 1,
                        SaveOutcome::Duplicate => {
                            debug!(file_id = %file.file_id, "already indexed");
                            report.duplicates += 1;
                        }
                    }
                }
                _ => report.unsupported += 1,
            }
        }

        if report.fetched % MAX_BATCH as u64 == 0 {
            info!(
                chat_id = chat_id.0,
                fetched = report.fetched,
                saved = report.saved,
                "indexing progress"
            );
        }
    }

    info!(
        chat_id = chat_id.0,
        fetched = report.fetched,
        saved = report.saved,
        duplicates = report.duplicates,
        empty = report.empty,
        unsupported = report.unsupported,
        "indexing finished"
    );
    Ok(report)
}

/// What became of one live channel post.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    Saved,
    Duplicate,
    /// No file, or an extension not in the allow list.
    Unsupported,
    /// The channel is not in the watched list.
    NotWatched,
}

/// Save the file of a post to one of the watched `channels`.
pub async fn index_post(
    store: &dyn Store,
    channels: &[ChatId],
    extensions: &[String],
    chat_id: ChatId,
    file: Option<&MediaFile>,
) -> Result<PostOutcome> {
    if !channels.contains(&chat_id) {
        return Ok(PostOutcome::NotWatched);
    }
    let Some(file) = file.filter(|f| accepts(extensions, f.extension().as_deref())) else {
        return Ok(PostOutcome::Unsupported);
    };
    let outcome = match store.save_media(file).await? {
        SaveOutcome::Saved => PostOutcome::Saved,
        SaveOutcome::Duplicate => PostOutcome::Duplicate,
    };
    debug!(chat_id = chat_id.0, file_id = %file.file_id, ?outcome, "channel post indexed");
    Ok(outcome)
}

fn accepts(extensions: &[String], ext: Option<&str>) -> bool {
    ext.is_some_and(|e| extensions.iter().any(|allowed| allowed == e))
}
