//! Drives a [`JobTracker`] against a live video provider until the job
//! reaches a terminal outcome.

use std::time::Instant;

use storyreel_core::polling::{JobOutcome, JobTracker, PollPolicy, RemoteJobStatus};
use storyreel_providers::video::VideoProvider;
use tokio_util::sync::CancellationToken;

/// Current instant on tokio's clock.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Poll `job_id` with exponential back-off until it completes, fails,
/// passes its deadline, or `cancel` fires.
///
/// `submitted_at` anchors the deadline, so a resumed job keeps the
/// budget it had left. Transient poll errors are logged and retried on
/// the next tick; permanent ones end the job as failed.
pub async fn poll_until_terminal(
    provider: &dyn VideoProvider,
    job_id: &str,
    policy: PollPolicy,
    submitted_at: Instant,
    cancel: &CancellationToken,
) -> JobOutcome {
    let mut tracker = JobTracker::new(job_id, policy, submitted_at);

    while let Some(wait) = tracker.next_wait(now()) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(job_id, "Video job polling cancelled");
                tracker.cancel();
                break;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        if tracker.check_deadline(now()) {
            break;
        }

        match provider.poll_status(job_id).await {
            Ok(status) => {
                tracing::debug!(job_id, ?status, "Video job status");
                tracker.observe(status, now());
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(job_id, error = %e, "Video job status check failed, will retry");
                tracker.check_deadline(now());
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Video job status check rejected");
                tracker.observe(
                    RemoteJobStatus::Failed {
                        message: format!("Status check failed: {e}"),
                    },
                    now(),
                );
            }
        }
    }

    match tracker.outcome() {
        Some(outcome) => outcome.clone(),
        // The loop only exits on a terminal phase.
        None => JobOutcome::Cancelled,
    }
}
