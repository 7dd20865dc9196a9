//! Background tasks whose death is observable.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

use crate::Result;

#[derive(Debug, Default)]
struct TaskHealth {
    finished: AtomicBool,
    failed: AtomicBool,
    failure: Mutex<Option<String>>,
}

/// A spawned task plus a monitor that records how it ended.
///
/// An error return, a panic, or an abort all mark the task unhealthy and are
/// logged; the caller never has to `.await` the task to find out.
#[derive(Debug)]
pub struct SupervisedTask {
    name: &'static str,
    health: Arc<TaskHealth>,
    abort: AbortHandle,
    monitor: JoinHandle<()>,
}

pub fn spawn_supervised<F>(name: &'static str, fut: F) -> SupervisedTask
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    let health = Arc::new(TaskHealth::default());
    let inner = tokio::spawn(fut);
    let abort = inner.abort_handle();

    let monitor_health = health.clone();
    let monitor = tokio::spawn(async move {
        let failure = match inner.await {
            Ok(Ok(())) => {
                info!(task = name, "background task finished");
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(join) if join.is_panic() => Some("task panicked".to_string()),
            Err(_) => Some("task was cancelled".to_string()),
        };

        if let Some(reason) = failure {
            error!(task = name, reason = %reason, "background task failed");
            monitor_health.failed.store(true, Ordering::SeqCst);
            if let Ok(mut slot) = monitor_health.failure.lock() {
                *slot = Some(reason);
            }
        }
        monitor_health.finished.store(true, Ordering::SeqCst);
    });

    SupervisedTask {
        name,
        health,
        abort,
        monitor,
    }
}

impl SupervisedTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.health.finished.load(Ordering::SeqCst)
    }

    pub fn is_healthy(&self) -> bool {
        !self.health.failed.load(Ordering::SeqCst)
    }

    pub fn failure(&self) -> Option<String> {
        self.health.failure.lock().ok().and_then(|f| f.clone())
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Wait until the monitor has recorded the outcome.
    pub async fn finished(self) {
        let _ = self.monitor.await;
    }
}
