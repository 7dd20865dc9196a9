use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    errors::Error,
    lifecycle::state::LifecycleState,
    ports::{Connector, Sleeper},
    utils::get_readable_time,
    Result,
};

/// Connect, honoring floodwait signals.
///
/// Each `Error::RateLimited { wait }` suspends for exactly `wait` and retries.
/// There is no retry cap; only success, a non-floodwait error, or `cancel`
/// ends the loop. Returns the number of connect attempts made.
pub async fn connect_with_flood_wait(
    connector: &dyn Connector,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut on_state: impl FnMut(LifecycleState) + Send,
) -> Result<u32> {
    let mut attempts = 0u32;
    loop {
        on_state(LifecycleState::Connecting);
        attempts += 1;

        let wait = match connector.connect().await {
            Ok(()) => return Ok(attempts),
            Err(Error::RateLimited { wait }) => wait,
            Err(e) => return Err(e),
        };

        on_state(LifecycleState::RateLimited { wait });
        warn!(
            attempt = attempts,
            wait = %get_readable_time(wait),
            "flood wait occurred, waiting before reconnecting"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = sleeper.sleep(wait) => {}
        }
        info!("flood wait over, ready for deploying");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, RecordingSleeper};
    use std::time::Duration;

    #[tokio::test]
    async fn retries_once_per_flood_wait_with_exact_waits() {
        let waits = vec![
            Duration::from_secs(3),
            Duration::from_secs(120),
            Duration::from_secs(7),
        ];
        let connector = FakeConnector::flooding(waits.clone());
        let sleeper = RecordingSleeper::default();
        let mut states = Vec::new();

        let attempts = connect_with_flood_wait(
            &connector,
            &sleeper,
            &CancellationToken::new(),
            |s| states.push(s),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 4);
        assert_eq!(connector.connect_calls(), 4);
        assert_eq!(sleeper.slept(), waits);
        assert_eq!(
            states,
            vec![
                LifecycleState::Connecting,
                LifecycleState::RateLimited { wait: waits[0] },
                LifecycleState::Connecting,
                LifecycleState::RateLimited { wait: waits[1] },
                LifecycleState::Connecting,
                LifecycleState::RateLimited { wait: waits[2] },
                LifecycleState::Connecting,
            ]
        );
    }

    #[tokio::test]
    async fn keeps_retrying_for_long_flood_sequences() {
        let waits = vec![Duration::from_secs(1); 250];
        let connector = FakeConnector::flooding(waits);
        let sleeper = RecordingSleeper::default();

        let attempts =
            connect_with_flood_wait(&connector, &sleeper, &CancellationToken::new(), |_| {})
                .await
                .unwrap();
        assert_eq!(attempts, 251);
        assert_eq!(sleeper.slept().len(), 250);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let connector = FakeConnector::failing("AUTH_KEY_UNREGISTERED");
        let sleeper = RecordingSleeper::default();

        let err = connect_with_flood_wait(&connector, &sleeper, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::External(_)));
        assert_eq!(connector.connect_calls(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let connector = FakeConnector::flooding(vec![Duration::from_secs(86_400)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = connect_with_flood_wait(
            &connector,
            &crate::ports::TokioSleeper,
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(connector.connect_calls(), 1);
    }
}
