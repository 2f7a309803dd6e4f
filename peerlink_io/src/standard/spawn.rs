use std::future::Future;
pub use tokio::task::{spawn, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Spawns `future` onto the runtime, racing it against `token`.
///
/// Resolves to `Some(output)` if the future finished first, or `None` if the token
/// was cancelled first (in which case the future is dropped at its current await point).
pub fn spawn_cancellable<F>(token: CancellationToken, future: F) -> JoinHandle<Option<F::Output>>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            res = future => Some(res),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::spawn_cancellable;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let res = spawn_cancellable(token, async { 7u8 }).await.unwrap();
        assert_eq!(res, Some(7));
    }

    #[tokio::test]
    async fn cancellation_drops_pending_future() {
        let token = CancellationToken::new();
        let handle = spawn_cancellable(token.clone(), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            1u8
        });
        token.cancel();
        let res = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res, None);
    }
}
