use std::time::Duration;

/// Where the startup protocol is.
///
/// `Idle → Connecting ⇄ RateLimited → Connected → Hydrating → Announcing → Running`,
/// with `Fatal` on any unrecoverable startup error and `Stopped` after shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    RateLimited { wait: Duration },
    Connected,
    Hydrating,
    Announcing,
    Running,
    Fatal,
    Stopped,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Fatal | LifecycleState::Stopped)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => f.write_str("idle"),
            LifecycleState::Connecting => f.write_str("connecting"),
            LifecycleState::RateLimited { wait } => write!(f, "rate-limited ({}s)", wait.as_secs()),
            LifecycleState::Connected => f.write_str("connected"),
            LifecycleState::Hydrating => f.write_str("hydrating"),
            LifecycleState::Announcing => f.write_str("announcing"),
            LifecycleState::Running => f.write_str("running"),
            LifecycleState::Fatal => f.write_str("fatal"),
            LifecycleState::Stopped => f.write_str("stopped"),
        }
    }
}
