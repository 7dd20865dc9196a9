use std::sync::{Arc, Mutex};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use afb_core::{
    config::Config,
    ports::{MessageSource, Store},
    session::SessionContext,
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub ctx: Arc<SessionContext>,
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn MessageSource>,
    pub indexing: Arc<IndexGuard>,
}

/// At most one `/index` run at a time; the running one can be cancelled.
#[derive(Default)]
pub struct IndexGuard {
    running: Arc<Mutex<Option<CancellationToken>>>,
}

/// Holds the `/index` slot; dropping it (even while unwinding) frees the slot.
pub struct IndexRun {
    slot: Arc<Mutex<Option<CancellationToken>>>,
    token: CancellationToken,
}

impl IndexRun {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for IndexRun {
    fn drop(&mut self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = None;
    }
}

impl IndexGuard {
    /// The slot for a new run, or `None` while another run is in progress.
    pub fn begin(&self) -> Option<IndexRun> {
        let mut slot = self.running.lock().ok()?;
        if slot.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Some(IndexRun {
            slot: self.running.clone(),
            token,
        })
    }

    /// Cancel the running index, if any.
    pub fn cancel(&self) -> bool {
        match self.running.lock() {
            Ok(slot) => slot.as_ref().map(|t| t.cancel()).is_some(),
            Err(_) => false,
        }
    }
}

/// Long-poll updates until `shutdown` fires.
pub async fn run_polling(bot: Bot, state: Arc<AppState>, shutdown: CancellationToken) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .default_handler(|_| async {})
        .build();

    let dispatcher_token = dispatcher.shutdown_token();
    let watcher = tokio::spawn(async move {
        shutdown.cancelled().await;
        state.indexing.cancel();
        match dispatcher_token.shutdown() {
            Ok(done) => done.await,
            Err(e) => warn!(err = ?e, "dispatcher was not running"),
        }
    });

    info!("dispatching updates");
    dispatcher.dispatch().await;
    watcher.abort();
    info!("dispatcher stopped");
}
