use std::time::Duration;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors (teloxide, grammers, rusqlite) into
/// this type so startup can tell fatal failures from retryable ones.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend asked us to wait before calling again (floodwait).
    #[error("rate limited, retry after {}s", wait.as_secs())]
    RateLimited { wait: Duration },

    /// A dependency the bot cannot run without (the database) did not answer.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// The bot lacks rights in a channel it must write to.
    #[error("make sure the bot is admin in {channel}: {reason}")]
    PermissionMissing { channel: String, reason: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// The mandated wait when this is a floodwait signal.
    pub fn flood_wait(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { wait } => Some(*wait),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
