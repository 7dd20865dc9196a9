//! Startup and shutdown of the bot.
//!
//! The controller takes the process from "nothing connected" to a hydrated,
//! announced [`SessionContext`]:
//! - connect, waiting out floodwaits (see [`flood_wait`])
//! - hydrate: banned sets, database ping, restart marker, indexes, own identity
//! - announce: start the HTTP listener, post to the log and bin channels, notify admins
//!
//! Fatal failures (database down, missing channel rights) are returned unchanged
//! to the caller; best-effort ones are logged and dropped.

pub mod flood_wait;
pub mod restart_marker;
pub mod state;

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::Config,
    domain::{ChatId, UserId},
    errors::Error,
    formatting::mention_html,
    messaging::{port::MessagingPort, types::Delivery},
    ports::{Connector, IdentityPort, Listener, Sleeper, Store},
    session::SessionContext,
    supervise::{spawn_supervised, SupervisedTask},
    Result,
};

pub use flood_wait::connect_with_flood_wait;
pub use restart_marker::{consume_restart_marker, MarkerOutcome, RestartMarker};
pub use state::LifecycleState;

pub const BIN_PROBE_TEXT: &str = "Test";
pub const ADMIN_NOTICE: &str = "<b>✅ ʙᴏᴛ ʀᴇsᴛᴀʀᴛᴇᴅ</b>";

/// Collaborators the controller drives.
#[derive(Clone)]
pub struct LifecycleDeps {
    pub connector: Arc<dyn Connector>,
    pub messenger: Arc<dyn MessagingPort>,
    pub identity: Arc<dyn IdentityPort>,
    pub store: Arc<dyn Store>,
    pub listener: Arc<dyn Listener>,
    pub sleeper: Arc<dyn Sleeper>,
}

#[derive(Clone, Debug)]
pub struct StartupOptions {
    pub log_channel: ChatId,
    pub bin_channel: ChatId,
    pub admins: Vec<UserId>,
    pub restart_file: PathBuf,
}

impl From<&Config> for StartupOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            log_channel: cfg.log_channel,
            bin_channel: cfg.bin_channel,
            admins: cfg.admins.clone(),
            restart_file: cfg.restart_file.clone(),
        }
    }
}

pub struct LifecycleController {
    deps: LifecycleDeps,
    opts: StartupOptions,
    cancel: CancellationToken,
    state: watch::Sender<LifecycleState>,
    listener: OnceLock<SupervisedTask>,
}

impl LifecycleController {
    pub fn new(deps: LifecycleDeps, opts: StartupOptions) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            deps,
            opts,
            cancel: CancellationToken::new(),
            state,
            listener: OnceLock::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Token that aborts a pending floodwait (e.g. on Ctrl+C).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The supervised HTTP listener, once startup has reached `Announcing`.
    pub fn listener(&self) -> Option<&SupervisedTask> {
        self.listener.get()
    }

    fn set_state(&self, next: LifecycleState) {
        debug!(state = %next, "lifecycle transition");
        self.state.send_replace(next);
    }

    /// Run the startup protocol up to `Running`.
    pub async fn start(&self) -> Result<Arc<SessionContext>> {
        match self.run_startup().await {
            Ok(ctx) => {
                self.set_state(LifecycleState::Running);
                info!(bot = %ctx.me.handle(), "startup complete");
                Ok(ctx)
            }
            Err(e) => {
                self.set_state(LifecycleState::Fatal);
                error!(err = %e, "startup aborted");
                Err(e)
            }
        }
    }

    /// Disconnect and acknowledge.
    pub async fn stop(&self) -> Result<()> {
        self.deps.connector.disconnect().await?;
        self.set_state(LifecycleState::Stopped);
        info!("Bot stopped! Bye...");
        Ok(())
    }

    async fn run_startup(&self) -> Result<Arc<SessionContext>> {
        connect_with_flood_wait(
            self.deps.connector.as_ref(),
            self.deps.sleeper.as_ref(),
            &self.cancel,
            |s| self.set_state(s),
        )
        .await?;
        self.set_state(LifecycleState::Connected);
        let started_at = Utc::now();

        let ctx = Arc::new(self.hydrate(started_at).await?);
        self.announce(&ctx).await?;
        Ok(ctx)
    }

    async fn hydrate(&self, started_at: chrono::DateTime<Utc>) -> Result<SessionContext> {
        self.set_state(LifecycleState::Hydrating);

        let banned = self.deps.store.load_banned().await?;
        info!(
            users = banned.users.len(),
            chats = banned.chats.len(),
            "loaded banned lists"
        );

        if let Err(e) = self.deps.store.ping().await {
            error!(err = %e, "make sure the database url is correct");
            return Err(e);
        }
        info!("successfully connected to the database");

        let marker = consume_restart_marker(&self.opts.restart_file, self.deps.messenger.as_ref()).await;
        debug!(?marker, "restart marker handled");

        self.deps.store.ensure_indexes().await?;

        let me = self.deps.identity.get_me().await?;
        info!(id = me.id.0, username = %me.handle(), "{} is started now", me.first_name);

        Ok(SessionContext {
            started_at,
            banned,
            me,
            messenger: self.deps.messenger.clone(),
        })
    }

    async fn announce(&self, ctx: &Arc<SessionContext>) -> Result<()> {
        self.set_state(LifecycleState::Announcing);

        let listener = self.deps.listener.clone();
        let task = spawn_supervised(listener.name(), listener.serve(ctx.clone()));
        if self.listener.set(task).is_err() {
            debug!("listener already started by an earlier start() call");
        }

        let messenger = self.deps.messenger.as_ref();

        let restarted = format!("<b>{} Restarted! 🤖</b>", mention_html(&ctx.me));
        messenger
            .send_html(self.opts.log_channel, &restarted)
            .await
            .map_err(|e| missing_rights("LOG_CHANNEL", e))?;

        let probe = messenger
            .send_html(self.opts.bin_channel, BIN_PROBE_TEXT)
            .await
            .map_err(|e| missing_rights("BIN_CHANNEL", e))?;
        messenger
            .delete_message(probe)
            .await
            .map_err(|e| missing_rights("BIN_CHANNEL", e))?;

        for admin in &self.opts.admins {
            let delivery = Delivery::of(&messenger.send_html(ChatId(admin.0), ADMIN_NOTICE).await);
            match delivery {
                Delivery::Delivered => debug!(admin = admin.0, "admin notified"),
                Delivery::Failed { reason } => {
                    info!(admin = admin.0, reason = %reason, "admin has not started this bot yet")
                }
            }
        }

        Ok(())
    }
}

fn missing_rights(channel: &str, e: Error) -> Error {
    error!(channel, err = %e, "make sure the bot is admin in {channel}");
    Error::PermissionMissing {
        channel: channel.to_string(),
        reason: e.to_string(),
    }
}
