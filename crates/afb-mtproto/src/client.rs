use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use afb_core::{config::Config as BotConfig, ports::Connector, Error, Result};
use async_trait::async_trait;
use grammers_client::{Client, Config, InitParams};
use grammers_session::Session;
use tracing::{debug, info, warn};

use crate::errors::{map_authorization, map_invocation};

#[derive(Clone, Debug)]
pub struct MtProtoSettings {
    pub api_id: i32,
    pub api_hash: String,
    pub bot_token: String,
    pub session_file: PathBuf,
}

impl From<&BotConfig> for MtProtoSettings {
    fn from(cfg: &BotConfig) -> Self {
        Self {
            api_id: cfg.api_id,
            api_hash: cfg.api_hash.clone(),
            bot_token: cfg.bot_token.clone(),
            session_file: cfg.session_file.clone(),
        }
    }
}

/// A bot-authorized grammers client, created on `connect`.
///
/// Floodwaits during connect or sign-in surface as `Error::RateLimited`, so the
/// same retry helper as the Bot API connection can drive it.
pub struct MtProtoClient {
    settings: MtProtoSettings,
    client: Mutex<Option<Client>>,
}

impl MtProtoClient {
    pub fn new(settings: MtProtoSettings) -> Self {
        Self {
            settings,
            client: Mutex::new(None),
        }
    }

    /// The connected client, or `Error::External` before `connect`.
    pub fn client(&self) -> Result<Client> {
        self.client
            .lock()
            .map_err(|_| Error::External("mtproto client mutex poisoned".to_string()))?
            .clone()
            .ok_or_else(|| Error::External("mtproto client is not connected".to_string()))
    }

    fn load_session(path: &Path) -> Result<Session> {
        if path.exists() {
            debug!(path = %path.display(), "loading mtproto session");
            return Session::load_file(path)
                .map_err(|e| Error::External(format!("failed to load session: {e}")));
        }
        info!(path = %path.display(), "creating new mtproto session");
        Ok(Session::new())
    }

    fn save_session(&self, client: &Client) -> Result<()> {
        let path = &self.settings.session_file;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // grammers-session 0.5 writes into an existing file.
        if !path.exists() {
            std::fs::File::create(path)?;
        }
        client
            .session()
            .save_to_file(path)
            .map_err(|e| Error::External(format!("failed to save session: {e}")))
    }
}

#[async_trait]
impl Connector for MtProtoClient {
    async fn connect(&self) -> Result<()> {
        if self.client().is_ok() {
            return Ok(());
        }

        let config = Config {
            session: Self::load_session(&self.settings.session_file)?,
            api_id: self.settings.api_id,
            api_hash: self.settings.api_hash.clone(),
            params: InitParams {
                device_model: "afb".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        };
        let client = Client::connect(config).await.map_err(map_authorization)?;

        if !client.is_authorized().await.map_err(map_invocation)? {
            info!("mtproto session not authorized, signing in as bot");
            client
                .bot_sign_in(&self.settings.bot_token)
                .await
                .map_err(map_authorization)?;
            self.save_session(&client)?;
        }

        let mut slot = self
            .client
            .lock()
            .map_err(|_| Error::External("mtproto client mutex poisoned".to_string()))?;
        *slot = Some(client);
        info!("mtproto client connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let taken = self
            .client
            .lock()
            .map_err(|_| Error::External("mtproto client mutex poisoned".to_string()))?
            .take();
        if let Some(client) = taken {
            if let Err(e) = self.save_session(&client) {
                warn!(err = %e, "failed to persist mtproto session");
            }
            info!("mtproto client disconnected");
        }
        Ok(())
    }
}
