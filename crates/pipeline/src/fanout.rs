//! Bounded, cancellable fan-out of per-unit provider work.
//!
//! Units of one stage run concurrently but never hold more than the
//! limiter's permits in flight. The limiter is shared by every stage of
//! an engine, so concurrent stages share one provider budget. Results
//! come back in input order regardless of completion order.

use std::future::Future;

use futures::future::join_all;
use storyreel_core::dependencies::Stage;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, PipelineResult};

/// Run `unit` for every item with bounded concurrency.
///
/// A cancelled token stops units waiting for a permit and drops units in
/// flight, which resolve to [`PipelineError::Cancelled`].
pub async fn run_bounded<I, T, F, Fut>(
    limiter: &Semaphore,
    cancel: &CancellationToken,
    stage: Stage,
    items: Vec<I>,
    unit: F,
) -> Vec<PipelineResult<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let tasks = items.into_iter().map(|item| {
        let work = unit(item);
        async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled { stage }),
                permit = limiter.acquire() => permit
                    .map_err(|_| PipelineError::Internal("Provider limiter closed".into()))?,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
                result = work => result,
            }
        }
    });
    join_all(tasks).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn never_exceeds_permits_and_keeps_order() {
        let limiter = Semaphore::new(2);
        let cancel = CancellationToken::new();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = run_bounded(&limiter, &cancel, Stage::Audio, (0..8).collect(), |n: u64| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Later items finish first.
                tokio::time::sleep(Duration::from_millis(20 - 2 * n)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n * 10)
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        let values: Vec<u64> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn cancellation_resolves_pending_units() {
        let limiter = Semaphore::new(1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let results = run_bounded(&limiter, &cancel, Stage::Image, vec![0u64, 1, 2], |n| {
            let trigger = trigger.clone();
            async move {
                if n == 0 {
                    trigger.cancel();
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(n)
            }
        })
        .await;

        for result in results {
            assert_matches!(result, Err(PipelineError::Cancelled { stage: Stage::Image }));
        }
    }
}
