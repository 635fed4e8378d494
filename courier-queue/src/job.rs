//! Job definition and retry bookkeeping.

use crate::config::DEFAULT_TIMEOUT;
use crate::error::{BoxError, QueueError};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = Uuid;

/// Upper bound on retries for a single job.
pub const MAX_RETRIES: u32 = 30;

/// Retries used when a job does not ask for a specific count.
pub const DEFAULT_RETRIES: u32 = 3;

/// Re-runnable job body. Called once per attempt.
pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Continuation invoked for every failed attempt.
pub type ErrorSink = Arc<dyn Fn(QueueError) + Send + Sync>;

/// Clamp a requested retry count to `[0, MAX_RETRIES]`.
pub fn clamp_retries(retries: u32) -> u32 {
    retries.min(MAX_RETRIES)
}

/// Job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in a lane
    Pending,
    /// Currently running an attempt
    Processing,
    /// Finished successfully
    Completed,
    /// Failed and requeued at the back of its lane
    Retrying,
    /// Failed with no retries left; dropped
    Dead,
}

/// A unit of queued work.
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Human readable label used in logs
    pub name: String,

    /// Lane the job was routed to (set by the router)
    pub lane: String,

    /// Per-attempt timeout; `None` uses the lane default
    pub timeout: Option<Duration>,

    /// Retries left before the job is dropped
    pub retries_remaining: u32,

    /// Attempts started so far
    pub attempts: u32,

    /// Current state
    pub state: JobState,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    task: JobTask,
    on_error: Option<ErrorSink>,
}

impl Job {
    /// Create a new job from a re-runnable async body.
    pub fn new<F, Fut>(name: impl Into<String>, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let task: JobTask = Arc::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(task())
        });

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            lane: String::new(),
            timeout: None,
            retries_remaining: DEFAULT_RETRIES,
            attempts: 0,
            state: JobState::Pending,
            created_at: Utc::now(),
            task,
            on_error: None,
        }
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry budget, clamped to `MAX_RETRIES`.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_remaining = clamp_retries(retries);
        self
    }

    /// Set the continuation called for every failed attempt.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(QueueError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Timeout that applies to the next attempt.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Check if the job can be retried.
    pub fn can_retry(&self) -> bool {
        self.retries_remaining > 0
    }

    /// Mark the job as processing and produce the future for this attempt.
    pub fn start_attempt(&mut self) -> BoxFuture<'static, Result<(), BoxError>> {
        self.state = JobState::Processing;
        self.attempts += 1;
        (self.task)()
    }

    /// Mark the job as completed.
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
    }

    /// Record a failed attempt. Returns `true` when the job should be requeued.
    pub fn fail(&mut self) -> bool {
        if self.can_retry() {
            self.retries_remaining -= 1;
            self.state = JobState::Retrying;
            true
        } else {
            self.state = JobState::Dead;
            false
        }
    }

    /// Hand a failure to the error continuation, if any.
    pub(crate) fn report(&self, error: QueueError) {
        if let Some(sink) = &self.on_error {
            sink(error);
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lane", &self.lane)
            .field("timeout", &self.timeout)
            .field("retries_remaining", &self.retries_remaining)
            .field("attempts", &self.attempts)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn noop_job() -> Job {
        Job::new("noop", || async { Ok(()) })
    }

    #[test]
    fn test_job_defaults() {
        let job = noop_job();

        assert_eq!(job.retries_remaining, DEFAULT_RETRIES);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.effective_timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_retries_are_clamped() {
        assert_eq!(noop_job().with_retries(100).retries_remaining, MAX_RETRIES);
        assert_eq!(noop_job().with_retries(0).retries_remaining, 0);
        assert_eq!(clamp_retries(7), 7);
    }

    #[test]
    fn test_retry_budget() {
        let mut job = noop_job().with_retries(2);

        assert!(job.fail());
        assert_eq!(job.state, JobState::Retrying);
        assert!(job.fail());
        assert!(!job.fail());
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.retries_remaining, 0);
    }

    #[test]
    fn test_job_id_uniqueness() {
        assert_ne!(noop_job().id, noop_job().id);
    }

    #[tokio::test]
    async fn test_start_attempt_runs_task() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let mut job = Job::new("count", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        job.start_attempt().await.unwrap();
        job.start_attempt().await.unwrap();

        assert_eq!(job.attempts, 2);
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        job.complete();
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn test_report_calls_error_handler() {
        let failures = Arc::new(AtomicU32::new(0));
        let seen = failures.clone();
        let job = noop_job().with_error_handler(move |err| {
            assert!(err.is_timeout());
            seen.fetch_add(1, Ordering::SeqCst);
        });

        job.report(QueueError::Timeout(Duration::from_secs(1)));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }
}
