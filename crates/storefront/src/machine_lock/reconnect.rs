//! Exponential-backoff reconnection after a dropped hub connection.
//!
//! The first attempt is made immediately; each failure is followed by a
//! growing pause. The loop gives up after `max_attempts` failures or as
//! soon as the cancellation token fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::connection::{HubConnection, HubConnector};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Pause after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on the pause between attempts.
    pub max_delay: Duration,
    /// Factor by which the pause grows after each failure.
    pub multiplier: f64,
    /// Attempts before giving up. `None` retries until cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: Some(4),
        }
    }
}

/// Calculate the next backoff delay, clamped to
/// [`ReconnectPolicy::max_delay`].
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn next_delay(current: Duration, policy: &ReconnectPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// How a reconnect loop ended.
pub(crate) enum ReconnectOutcome {
    Connected(HubConnection),
    Cancelled,
    Exhausted,
}

/// Reconnect with exponential backoff.
pub(crate) async fn reconnect_loop(
    connector: &HubConnector,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tracing::info!(attempt, "Reconnecting to machine hub");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = connector.connect() => match result {
                Ok(conn) => {
                    tracing::info!(attempt, "Reconnected to machine hub");
                    return ReconnectOutcome::Connected(conn);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            tracing::warn!(attempt, "Giving up on machine hub");
            return ReconnectOutcome::Exhausted;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, policy);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;
    use vending_core::SessionId;

    use super::*;

    fn unreachable_connector() -> HubConnector {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let hub_url = Url::parse(&format!("http://127.0.0.1:{port}/vendingMachineHub")).unwrap();
        HubConnector::new(
            reqwest::Client::new(),
            hub_url,
            SessionId::from_stored("test-session").unwrap(),
            false,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_next_delay_doubles() {
        let policy = ReconnectPolicy::default();
        assert_eq!(next_delay(Duration::from_secs(2), &policy), Duration::from_secs(4));
    }

    #[test]
    fn test_next_delay_clamps_at_max() {
        let policy = ReconnectPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(8), &policy), Duration::from_secs(10));
        assert_eq!(next_delay(Duration::from_secs(10), &policy), Duration::from_secs(10));
    }

    #[test]
    fn test_full_backoff_sequence() {
        let policy = ReconnectPolicy::default();
        let mut delay = policy.initial_delay;
        let expected = [2, 4, 8, 16, 30, 30];

        for &expected_secs in &expected {
            assert_eq!(delay.as_secs(), expected_secs);
            delay = next_delay(delay, &policy);
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_reconnect() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = reconnect_loop(&unreachable_connector(), &ReconnectPolicy::default(), &cancel).await;
        assert!(matches!(outcome, ReconnectOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_attempts: Some(2),
        };

        let outcome = reconnect_loop(&unreachable_connector(), &policy, &CancellationToken::new()).await;
        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
    }
}
