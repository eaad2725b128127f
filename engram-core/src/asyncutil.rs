//! Small async helpers shared by the engines: timeout wrapping, bounded
//! concurrency, and a settle-style join that never short-circuits.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};

/// Run `fut` under a timeout. `None` means the deadline elapsed.
pub async fn with_timeout<T>(duration: Duration, fut: impl Future<Output = T>) -> Option<T> {
    tokio::time::timeout(duration, fut).await.ok()
}

/// Map `items` through an async function with at most `concurrency`
/// in-flight at once, preserving input order.
pub async fn map_bounded<T, U, F, Fut>(concurrency: usize, items: Vec<T>, f: F) -> Vec<U>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = U>,
{
    stream::iter(items.into_iter().map(f))
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Await every future and collect each outcome, never short-circuiting on
/// the first error.
pub async fn settle_all<T, E, Fut>(futures: Vec<Fut>) -> Vec<Result<T, E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_returns_none_when_elapsed() {
        let out = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            42
        })
        .await;
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn timeout_passes_result_through() {
        let out = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(out, Some(42));
    }

    #[tokio::test]
    async fn map_bounded_preserves_order() {
        let items = vec![3u64, 1, 2];
        let out = map_bounded(2, items, |n| async move {
            tokio::time::sleep(Duration::from_millis(n * 5)).await;
            n * 10
        })
        .await;
        assert_eq!(out, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn settle_all_keeps_errors() {
        let futs = vec![
            Box::pin(async { Ok::<_, String>(1) }) as std::pin::Pin<Box<dyn Future<Output = _>>>,
            Box::pin(async { Err("boom".to_string()) }),
        ];
        let out = settle_all(futs).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
    }
}
