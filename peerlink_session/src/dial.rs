//! The bounded connect-retry sequence run by the dialer role.
//!
//! A sequence makes at most `max_attempts` connect attempts. Each one is timeboxed
//! and separated from the next by a fixed backoff. There is no backoff after the last
//! attempt. Cancelling the token aborts the sequence wherever it is, including in the
//! middle of a backoff sleep.

use crate::config::SessionConfig;
use crate::error::SessionError;
use peerlink_io::{tokio, CancellationToken};
use peerlink_wire::{ConnectionId, SocketTransport, WireError};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RetryBudget {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            attempt_timeout,
        }
    }

    /// Upper bound on how long a whole sequence can take
    pub fn worst_case(&self) -> Duration {
        (self.attempt_timeout + self.backoff) * self.max_attempts
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}

impl From<&SessionConfig> for RetryBudget {
    fn from(cfg: &SessionConfig) -> Self {
        Self::new(cfg.max_dial_attempts, cfg.dial_backoff, cfg.dial_timeout)
    }
}

/// Connects `transport` to `addr:port` within `budget`. `on_attempt` is called with the
/// 1-based attempt number right before each attempt
pub async fn dial_with_retry<F>(
    transport: &SocketTransport,
    addr: IpAddr,
    port: u16,
    budget: &RetryBudget,
    cancel: &CancellationToken,
    mut on_attempt: F,
) -> Result<(ConnectionId, SocketAddr), SessionError>
where
    F: FnMut(u32, SocketAddr),
{
    let target = SocketAddr::new(addr, port);
    let mut last_error: Option<WireError> = None;

    for attempt in 1..=budget.max_attempts {
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        log::debug!(target: "peerlink", "Connection attempt {attempt}/{} to {target}", budget.max_attempts);
        on_attempt(attempt, target);

        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            res = transport.connect(addr, port, budget.attempt_timeout) => res,
        };

        match res {
            Ok(connected) => return Ok(connected),
            Err(err) if err.is_transient() => {
                log::warn!(target: "peerlink", "Connection attempt {attempt} failed: {err}");
                last_error = Some(err);
            }
            Err(err) => return Err(err.into()),
        }

        if attempt < budget.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(budget.backoff) => {}
            }
        }
    }

    Err(SessionError::DialExhausted {
        attempts: budget.max_attempts,
        last_error: last_error.map(|err| err.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerlink_wire::TransportConfig;
    use std::net::Ipv4Addr;
    use std::time::Instant;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn transport() -> SocketTransport {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        SocketTransport::new(TransportConfig::default(), tx)
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn unreachable_owner_exhausts_budget() {
        peerlink_logging::setup_log();
        let budget = RetryBudget::new(5, Duration::from_millis(100), Duration::from_millis(200));
        let port = closed_port();
        let mut attempts = Vec::new();

        let start = Instant::now();
        let res = dial_with_retry(
            &transport(),
            LOCALHOST,
            port,
            &budget,
            &CancellationToken::new(),
            |attempt, addr| {
                assert_eq!(addr.port(), port);
                attempts.push(attempt);
            },
        )
        .await;
        let elapsed = start.elapsed();

        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
        assert!(
            matches!(res, Err(SessionError::DialExhausted { attempts: 5, .. })),
            "{res:?}"
        );
        // four backoffs, none after the final attempt
        assert!(elapsed >= budget.backoff * 4, "{elapsed:?}");
        assert!(
            elapsed <= budget.worst_case() + Duration::from_secs(1),
            "{elapsed:?}"
        );
    }

    #[tokio::test]
    async fn first_success_stops_the_sequence() {
        peerlink_logging::setup_log();
        let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let budget = RetryBudget::new(5, Duration::from_secs(10), Duration::from_secs(2));
        let mut attempts = 0;

        let transport = transport();
        let (_, peer) = dial_with_retry(
            &transport,
            LOCALHOST,
            port,
            &budget,
            &CancellationToken::new(),
            |_, _| attempts += 1,
        )
        .await
        .unwrap();

        assert_eq!(attempts, 1);
        assert_eq!(peer.port(), port);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff() {
        peerlink_logging::setup_log();
        let budget = RetryBudget::new(5, Duration::from_secs(30), Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let mut attempts = 0;
        let res = dial_with_retry(
            &transport(),
            LOCALHOST,
            closed_port(),
            &budget,
            &cancel,
            |_, _| attempts += 1,
        )
        .await;

        canceller.await.unwrap();
        assert_eq!(res, Err(SessionError::Cancelled));
        assert_eq!(attempts, 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timed_out_attempts_are_retried() {
        peerlink_logging::setup_log();
        let unroutable = IpAddr::V4(Ipv4Addr::new(10, 255, 255, 1));
        let budget = RetryBudget::new(2, Duration::from_millis(50), Duration::from_millis(200));
        let mut attempts = 0;

        let start = Instant::now();
        let res = dial_with_retry(
            &transport(),
            unroutable,
            8888,
            &budget,
            &CancellationToken::new(),
            |_, _| attempts += 1,
        )
        .await;
        let elapsed = start.elapsed();

        let last_error = match res {
            Err(SessionError::DialExhausted {
                attempts: 2,
                last_error,
            }) => last_error,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(attempts, 2);

        let timed_out = WireError::ConnectTimeout(SocketAddr::new(unroutable, 8888));
        if last_error != timed_out.to_string() {
            log::trace!(target: "peerlink", "Skipping timeout checks since the route is rejected locally: {last_error}");
            return;
        }

        assert_eq!(
            SessionError::from(timed_out),
            SessionError::DialTimeout(SocketAddr::new(unroutable, 8888))
        );
        assert!(elapsed >= budget.attempt_timeout * 2 + budget.backoff, "{elapsed:?}");
        assert!(elapsed <= budget.worst_case() + Duration::from_secs(1), "{elapsed:?}");
    }

    #[test]
    fn worst_case_covers_every_attempt() {
        let budget = RetryBudget::from(&SessionConfig::default());
        assert_eq!(budget.max_attempts, 5);
        assert_eq!(budget.worst_case(), Duration::from_secs(30));
    }
}
