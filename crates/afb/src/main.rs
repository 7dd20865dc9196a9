use std::sync::Arc;

use teloxide::Bot;
use tracing::{debug, error, info, warn};

use afb_core::{
    config::Config,
    lifecycle::{connect_with_flood_wait, LifecycleController, LifecycleDeps, StartupOptions},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::{Connector, TokioSleeper},
};
use afb_mtproto::{MtProtoClient, MtProtoSettings, MtProtoSource};
use afb_store::SqliteStore;
use afb_telegram::{
    router::{run_polling, AppState},
    TelegramConnector, TelegramMessenger,
};
use afb_web::{PublicEndpoint, WebListener};

#[tokio::main]
async fn main() -> Result<(), afb_core::Error> {
    afb_core::logging::init("afb")?;

    let cfg = Arc::new(Config::load()?);
    // Opened on first use, inside the controller's hydration step.
    let store = Arc::new(SqliteStore::lazy(&cfg.database_url, &cfg.collection_name)?);

    let bot = Bot::new(cfg.bot_token.clone());
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let connector = Arc::new(TelegramConnector::new(bot.clone()));

    let controller = LifecycleController::new(
        LifecycleDeps {
            connector: connector.clone(),
            messenger,
            identity: connector,
            store: store.clone(),
            listener: Arc::new(WebListener::new(
                cfg.port,
                store.clone(),
                PublicEndpoint::from(cfg.as_ref()),
            )),
            sleeper: Arc::new(TokioSleeper),
        },
        StartupOptions::from(cfg.as_ref()),
    );

    // Ctrl+C aborts a pending floodwait during startup and stops the dispatcher later.
    let shutdown = controller.cancel_token();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl+c received, shutting down");
            }
            shutdown.cancel();
        });
    }

    let ctx = controller.start().await?;

    let mtproto = Arc::new(MtProtoClient::new(MtProtoSettings::from(cfg.as_ref())));
    match connect_with_flood_wait(mtproto.as_ref(), &TokioSleeper, &shutdown, |s| {
        debug!(state = %s, "mtproto connection")
    })
    .await
    {
        Ok(attempts) => info!(attempts, "mtproto ready, /index available"),
        Err(e) => warn!(err = %e, "mtproto unavailable, /index will fail"),
    }
    let source = Arc::new(MtProtoSource::new(
        mtproto.clone(),
        cfg.channel_access_hashes.clone(),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        ctx,
        store,
        source,
        indexing: Default::default(),
    });
    run_polling(bot, state, shutdown).await;

    if let Some(listener) = controller.listener() {
        listener.abort();
    }
    if let Err(e) = mtproto.disconnect().await {
        error!(err = %e, "mtproto disconnect failed");
    }
    controller.stop().await?;
    Ok(())
}
