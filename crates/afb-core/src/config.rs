use std::{collections::HashMap, env, net::Ipv4Addr, path::PathBuf};

use crate::{
    domain::{ChatId, UserId},
    errors::Error,
    Result,
};

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram credentials
    pub bot_token: String,
    pub api_id: i32,
    pub api_hash: String,

    // People and channels
    pub admins: Vec<UserId>,
    pub log_channel: ChatId,
    pub bin_channel: ChatId,
    pub index_channels: Vec<ChatId>,
    /// MTProto access hashes keyed by Bot API chat id (`CHANNEL_ACCESS_HASHES`).
    pub channel_access_hashes: HashMap<i64, i64>,

    // Storage
    pub database_url: PathBuf,
    pub collection_name: String,
    pub index_extensions: Vec<String>,

    // HTTP
    pub port: u16,
    pub public_url: String,
    pub is_stream: bool,

    // Runtime files
    pub restart_file: PathBuf,
    pub session_file: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, using process environment only");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let bot_token = required(get("BOT_TOKEN"), "BOT_TOKEN")?;
        let api_id = parse_num::<i32>(&required(get("API_ID"), "API_ID")?, "API_ID")?;
        let api_hash = required(get("API_HASH"), "API_HASH")?;

        let admins = parse_ids(&required(get("ADMINS"), "ADMINS")?, "ADMINS")?
            .into_iter()
            .map(UserId)
            .collect();
        let log_channel = ChatId(parse_num(
            &required(get("LOG_CHANNEL"), "LOG_CHANNEL")?,
            "LOG_CHANNEL",
        )?);
        let bin_channel = ChatId(parse_num(
            &required(get("BIN_CHANNEL"), "BIN_CHANNEL")?,
            "BIN_CHANNEL",
        )?);

        let index_channels: Vec<ChatId> = parse_ids(
            &get("INDEX_CHANNELS").unwrap_or_default(),
            "INDEX_CHANNELS",
        )?
        .into_iter()
        .map(ChatId)
        .collect();
        if index_channels.is_empty() {
            tracing::info!("INDEX_CHANNELS is empty");
        }

        let channel_access_hashes =
            parse_pairs(&get("CHANNEL_ACCESS_HASHES").unwrap_or_default())?;

        let database_url = PathBuf::from(required(get("DATABASE_URL"), "DATABASE_URL")?);
        let collection_name = get("COLLECTION_NAME")
            .and_then(non_empty)
            .unwrap_or_else(|| "Files".to_string());
        if !is_identifier(&collection_name) {
            return Err(Error::Config(format!(
                "COLLECTION_NAME must be alphanumeric/underscore, got {collection_name:?}"
            )));
        }
        let index_extensions = parse_words_lower(
            &get("INDEX_EXTENSIONS").unwrap_or_else(|| "mp4 mkv".to_string()),
        );

        let port = match get("PORT").and_then(non_empty) {
            Some(v) => parse_num::<u16>(&v, "PORT")?,
            None => 8000,
        };
        let public_url = normalize_url(&required(get("URL"), "URL")?)?;
        let is_stream = is_enabled(get("IS_STREAM"), "IS_STREAM", true)?;

        let restart_file = PathBuf::from(
            get("RESTART_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "restart.txt".to_string()),
        );
        let session_file = PathBuf::from(
            get("SESSION_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "afb.session".to_string()),
        );

        Ok(Self {
            bot_token,
            api_id,
            api_hash,
            admins,
            log_channel,
            bin_channel,
            index_channels,
            channel_access_hashes,
            database_url,
            collection_name,
            index_extensions,
            port,
            public_url,
            is_stream,
            restart_file,
            session_file,
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admins.contains(&user_id)
    }
}

fn required(v: Option<String>, key: &str) -> Result<String> {
    v.and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("{key} is missing")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn parse_num<T: std::str::FromStr>(s: &str, key: &str) -> Result<T> {
    s.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} is not a valid number: {s:?}")))
}

fn parse_ids(s: &str, key: &str) -> Result<Vec<i64>> {
    s.split_whitespace().map(|part| parse_num(part, key)).collect()
}

/// `chat:hash chat:hash ...`
fn parse_pairs(s: &str) -> Result<HashMap<i64, i64>> {
    s.split_whitespace()
        .map(|pair| {
            let (chat, hash) = pair.split_once(':').ok_or_else(|| {
                Error::Config(format!("CHANNEL_ACCESS_HASHES entry {pair:?} is not chat:hash"))
            })?;
            Ok((
                parse_num(chat, "CHANNEL_ACCESS_HASHES")?,
                parse_num(hash, "CHANNEL_ACCESS_HASHES")?,
            ))
        })
        .collect()
}

fn parse_words_lower(s: &str) -> Vec<String> {
    s.split_whitespace()
        .map(|w| w.trim_start_matches('.').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Strict boolean flag: unknown spellings are a config error rather than `false`.
fn is_enabled(v: Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(raw) = v.and_then(non_empty) else {
        return Ok(default);
    };
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" | "enable" | "y" => Ok(true),
        "false" | "no" | "0" | "disable" | "n" => Ok(false),
        _ => Err(Error::Config(format!("{key} is invalid: {raw:?}"))),
    }
}

/// `http(s)://…` gets a trailing slash, a bare IPv4 becomes `http://<ip>/`.
fn normalize_url(raw: &str) -> Result<String> {
    if raw.starts_with("https://") || raw.starts_with("http://") {
        if raw.ends_with('/') {
            return Ok(raw.to_string());
        }
        return Ok(format!("{raw}/"));
    }
    let host = raw.split(':').next().unwrap_or(raw);
    if host.parse::<Ipv4Addr>().is_ok() {
        return Ok(format!("http://{raw}/"));
    }
    Err(Error::Config(format!("URL is not valid: {raw:?}")))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}
