//! Asynchronous provider job state machine with back-off and deadline.
//!
//! A submitted job moves `submitted -> polling -> terminal`. Each
//! observation of the remote status either keeps it polling (with an
//! exponentially growing, clamped delay) or makes it terminal. Passing
//! the deadline is itself a terminal outcome, so a job can never stay
//! in flight forever. Time is injected so the machine stays pure.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable parameters for polling an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first status check.
    pub initial_delay: Duration,
    /// Upper bound on the delay between checks.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each non-terminal check.
    pub multiplier: f64,
    /// Hard deadline measured from submission.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            multiplier: 1.5,
            timeout: Duration::from_secs(900),
        }
    }
}

/// Shortest wait between two status checks.
pub const MIN_POLL_DELAY: Duration = Duration::from_millis(1);

/// Calculate the next delay from the current one.
///
/// The result is clamped to [`PollPolicy::max_delay`] and never drops
/// below [`MIN_POLL_DELAY`].
pub fn next_delay(current: Duration, policy: &PollPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms)
        .min(policy.max_delay)
        .max(MIN_POLL_DELAY)
}

// ---------------------------------------------------------------------------
// Remote status and outcomes
// ---------------------------------------------------------------------------

/// Status reported by a video provider for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RemoteJobStatus {
    Queued,
    Processing,
    Completed { output_locator: String },
    Failed { message: String },
}

/// How a job finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { output_locator: String },
    Failed { message: String },
    TimedOut { after: Duration },
    Cancelled,
}

impl JobOutcome {
    /// Error message to persist on the owning record, if the job did not succeed.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { message } => Some(message.clone()),
            Self::TimedOut { after } => Some(format!(
                "Video job timed out after {}s without reaching a terminal state",
                after.as_secs()
            )),
            Self::Cancelled => Some("Video job polling was cancelled".to_string()),
        }
    }
}

/// Phase of a tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Submitted,
    Polling { attempts: u32 },
    Terminal(JobOutcome),
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Tracks one provider job from submission to a terminal outcome.
#[derive(Debug, Clone)]
pub struct JobTracker {
    job_id: String,
    policy: PollPolicy,
    phase: JobPhase,
    delay: Duration,
    submitted_at: Instant,
}

impl JobTracker {
    pub fn new(job_id: impl Into<String>, policy: PollPolicy, submitted_at: Instant) -> Self {
        Self {
            job_id: job_id.into(),
            delay: policy.initial_delay.max(MIN_POLL_DELAY),
            policy,
            phase: JobPhase::Submitted,
            submitted_at,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn phase(&self) -> &JobPhase {
        &self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, JobPhase::Terminal(_))
    }

    /// The terminal outcome, once reached.
    pub fn outcome(&self) -> Option<&JobOutcome> {
        match &self.phase {
            JobPhase::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Instant after which the job is considered timed out.
    pub fn deadline(&self) -> Instant {
        self.submitted_at + self.policy.timeout
    }

    /// How long to wait before the next status check, or `None` once
    /// terminal. Never waits past the deadline.
    pub fn next_wait(&self, now: Instant) -> Option<Duration> {
        if self.is_terminal() {
            return None;
        }
        let remaining = self.deadline().saturating_duration_since(now);
        Some(self.delay.min(remaining))
    }

    /// Record a status observation made at `now`.
    pub fn observe(&mut self, status: RemoteJobStatus, now: Instant) -> &JobPhase {
        if self.is_terminal() {
            return &self.phase;
        }
        self.phase = match status {
            RemoteJobStatus::Completed { output_locator } => {
                JobPhase::Terminal(JobOutcome::Completed { output_locator })
            }
            RemoteJobStatus::Failed { message } => {
                JobPhase::Terminal(JobOutcome::Failed { message })
            }
            RemoteJobStatus::Queued | RemoteJobStatus::Processing => {
                if now >= self.deadline() {
                    JobPhase::Terminal(JobOutcome::TimedOut {
                        after: self.policy.timeout,
                    })
                } else {
                    let attempts = match self.phase {
                        JobPhase::Polling { attempts } => attempts + 1,
                        _ => 1,
                    };
                    self.delay = next_delay(self.delay, &self.policy);
                    JobPhase::Polling { attempts }
                }
            }
        };
        &self.phase
    }

    /// Force a timeout if the deadline has passed. Returns `true` when
    /// the job became terminal because of this call.
    pub fn check_deadline(&mut self, now: Instant) -> bool {
        if !self.is_terminal() && now >= self.deadline() {
            self.phase = JobPhase::Terminal(JobOutcome::TimedOut {
                after: self.policy.timeout,
            });
            return true;
        }
        false
    }

    /// Abandon the job.
    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.phase = JobPhase::Terminal(JobOutcome::Cancelled);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
