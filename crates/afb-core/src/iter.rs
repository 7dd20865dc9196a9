//! Paged message iteration over a bulk fetch-by-id primitive.
//!
//! The backend accepts at most [`MAX_BATCH`] ids per call; `iter_messages`
//! hides that limit behind a lazy, forward-only stream.

use futures::stream::{self, Stream};

use crate::{
    domain::{ChatId, IndexedMessage, MessageId},
    ports::MessageSource,
    Error, Result,
};

/// Hard per-call limit of the underlying fetch.
pub const MAX_BATCH: i64 = 200;

/// Exclusive upper bound of a position: message ids are `i32`.
pub const MAX_POSITION: i64 = i32::MAX as i64 + 1;

/// Position within one iteration: `current` advances by one per yielded item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    pub current: i64,
    pub limit: i64,
}

impl PageCursor {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            current: offset,
            limit,
        }
    }

    /// Size of the next batch, `None` once `limit` is reached.
    pub fn next_batch(&self) -> Option<i64> {
        let size = MAX_BATCH.min(self.limit - self.current);
        (size > 0).then_some(size)
    }

    /// Positions must map onto message ids without wrapping.
    pub fn validate(&self) -> Result<()> {
        if self.current < 0 || self.limit > MAX_POSITION {
            return Err(Error::Config(format!(
                "positions {}..{} are outside 0..{MAX_POSITION}",
                self.current, self.limit
            )));
        }
        Ok(())
    }

    /// Ids of the next batch, contiguous from `current`. Ids that do not fit a
    /// message id end the batch early.
    pub fn next_ids(&self) -> Option<Vec<MessageId>> {
        let size = self.next_batch()?;
        let ids: Vec<MessageId> = (self.current..self.current + size)
            .map_while(|id| i32::try_from(id).ok().map(MessageId))
            .collect();
        (!ids.is_empty()).then_some(ids)
    }

    pub fn advance(&mut self) {
        self.current += 1;
    }
}

struct IterState<'a, S: ?Sized> {
    source: &'a S,
    chat_id: ChatId,
    cursor: PageCursor,
    buffered: std::vec::IntoIter<IndexedMessage>,
    failed: bool,
}

/// Messages at positions `offset .. limit` of `chat_id`, fetched lazily in
/// batches of at most [`MAX_BATCH`].
///
/// A fetch error is yielded once and ends the stream; nothing is retried here.
/// A range outside `0..MAX_POSITION` yields one [`Error::Config`] before any fetch.
/// To resume, call again with the last seen position as `offset`.
pub fn iter_messages<'a, S>(
    source: &'a S,
    chat_id: ChatId,
    limit: i64,
    offset: i64,
) -> impl Stream<Item = Result<IndexedMessage>> + Send + 'a
where
    S: MessageSource + ?Sized,
{
    let state = IterState {
        source,
        chat_id,
        cursor: PageCursor::new(offset, limit),
        buffered: Vec::new().into_iter(),
        failed: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.failed {
                return None;
            }
            if let Err(e) = st.cursor.validate() {
                st.failed = true;
                return Some((Err(e), st));
            }
            if let Some(msg) = st.buffered.next() {
                st.cursor.advance();
                return Some((Ok(msg), st));
            }

            let ids = st.cursor.next_ids()?;
            match st.source.fetch(st.chat_id, &ids).await {
                Ok(batch) => {
                    if batch.is_empty() {
                        // Nothing came back for a non-empty request; stop rather than spin.
                        tracing::warn!(
                            chat_id = st.chat_id.0,
                            from = st.cursor.current,
                            requested = ids.len(),
                            "batch fetch returned no messages, ending iteration"
                        );
                        return None;
                    }
                    if batch.len() != ids.len() {
                        tracing::debug!(
                            chat_id = st.chat_id.0,
                            requested = ids.len(),
                            returned = batch.len(),
                            "batch size mismatch, positions will drift"
                        );
                    }
                    st.buffered = batch.into_iter();
                }
                Err(e) => {
                    st.failed = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use futures::{StreamExt, TryStreamExt};

    #[test]
    fn cursor_batches() {
        let mut c = PageCursor::new(0, 450);
        assert_eq!(c.next_batch(), Some(200));
        c.current = 400;
        assert_eq!(c.next_batch(), Some(50));
        c.current = 450;
        assert_eq!(c.next_batch(), None);
        assert_eq!(PageCursor::new(100, 100).next_batch(), None);
        assert_eq!(PageCursor::new(120, 100).next_batch(), None);
    }

    #[test]
    fn cursor_ids_are_contiguous_from_current() {
        let c = PageCursor::new(10, 13);
        assert_eq!(
            c.next_ids().unwrap(),
            vec![MessageId(10), MessageId(11), MessageId(12)]
        );
    }

    #[test]
    fn cursor_rejects_positions_past_message_ids() {
        assert!(PageCursor::new(0, MAX_POSITION).validate().is_ok());
        assert!(PageCursor::new(0, MAX_POSITION + 1).validate().is_err());
        assert!(PageCursor::new(-1, 10).validate().is_err());
    }

    #[tokio::test]
    async fn last_valid_id_is_reached_without_wrapping() {
        let source = FakeSource::default();
        let msgs: Vec<IndexedMessage> =
            iter_messages(&source, ChatId(-100), MAX_POSITION, i32::MAX as i64)
                .try_collect()
                .await
                .unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, MessageId(i32::MAX));
    }

    #[tokio::test]
    async fn range_past_message_ids_fails_before_fetching() {
        let source = FakeSource::default();
        let items: Vec<Result<IndexedMessage>> =
            iter_messages(&source, ChatId(-100), MAX_POSITION + 1, i32::MAX as i64)
                .collect()
                .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Config(_))));
        assert!(source.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn pages_in_batches_of_200() {
        let source = FakeSource::default();
        let msgs: Vec<IndexedMessage> = iter_messages(&source, ChatId(-100), 450, 0)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(source.batch_sizes(), vec![200, 200, 50]);
        let ids: Vec<i32> = msgs.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, (0..450).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn limit_not_above_offset_is_empty() {
        let source = FakeSource::default();
        let count = iter_messages(&source, ChatId(-100), 100, 100).count().await;
        assert_eq!(count, 0);
        assert!(source.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn offset_starts_mid_chat() {
        let source = FakeSource::default();
        let msgs: Vec<IndexedMessage> = iter_messages(&source, ChatId(-100), 260, 50)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(source.batch_sizes(), vec![200, 10]);
        assert_eq!(msgs.first().map(|m| m.id.0), Some(50));
        assert_eq!(msgs.last().map(|m| m.id.0), Some(259));
    }

    #[tokio::test]
    async fn is_lazy() {
        let source = FakeSource::default();
        let mut stream = Box::pin(iter_messages(&source, ChatId(-100), 1_000, 0));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.id, MessageId(0));
        assert_eq!(source.batch_sizes(), vec![200]);
    }

    #[tokio::test]
    async fn fetch_error_ends_the_stream() {
        let source = FakeSource {
            fail_on_call: Some(1),
            ..Default::default()
        };
        let items: Vec<Result<IndexedMessage>> =
            iter_messages(&source, ChatId(-100), 450, 0).collect().await;

        assert_eq!(items.len(), 201);
        assert!(items[..200].iter().all(|r| r.is_ok()));
        assert!(matches!(items[200], Err(Error::External(_))));
        assert_eq!(source.batch_sizes(), vec![200, 200]);
    }

    #[tokio::test]
    async fn short_batches_advance_per_item() {
        // Every batch comes back one short; the cursor moves by what was yielded,
        // so the next request starts at the first missing id.
        let source = FakeSource {
            drop_last: true,
            ..Default::default()
        };
        let msgs: Vec<IndexedMessage> = iter_messages(&source, ChatId(-100), 250, 0)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(source.batch_sizes(), vec![200, 51, 1]);
        assert_eq!(msgs.len(), 249);
        assert_eq!(msgs[199].id, MessageId(199));
    }
}
