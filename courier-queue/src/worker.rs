//! Lane worker: drains one lane's FIFO, one job at a time.

use crate::error::{QueueError, panic_message};
use crate::job::Job;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, warn};

#[derive(Default)]
struct LaneState {
    jobs: VecDeque<Job>,
    draining: bool,
}

/// Worker owning the FIFO of a single lane.
///
/// At most one drain loop runs per worker. Enqueueing while the worker is
/// draining only appends to the FIFO.
///
/// Drain loops and job attempts always run on the runtime the worker was
/// created with, whichever runtime the caller of [`LaneWorker::enqueue`]
/// happens to be on.
pub struct LaneWorker {
    lane: String,
    state: Mutex<LaneState>,
    draining: watch::Sender<bool>,
    runtime: Handle,
}

impl LaneWorker {
    /// Create an idle worker for a lane, running its jobs on `runtime`.
    pub fn new(lane: impl Into<String>, runtime: Handle) -> Self {
        let (draining, _) = watch::channel(false);
        Self {
            lane: lane.into(),
            state: Mutex::new(LaneState::default()),
            draining,
            runtime,
        }
    }

    /// Lane name.
    pub fn lane(&self) -> &str {
        &self.lane
    }

    /// Number of jobs waiting (not counting the one running).
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Whether no jobs are waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// Whether a drain loop is currently active.
    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    /// Whether the worker is idle: not draining and nothing queued.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.draining && state.jobs.is_empty()
    }

    /// Append a job, starting the drain loop if the worker was idle.
    ///
    /// Returns `true` when this call started a new drain loop.
    pub fn enqueue(self: &Arc<Self>, job: Job) -> bool {
        debug!(lane = %self.lane, job_id = %job.id, job = %job.name, "Enqueueing job");

        let start = {
            let mut state = self.lock();
            state.jobs.push_back(job);
            if state.draining {
                false
            } else {
                state.draining = true;
                self.draining.send_replace(true);
                true
            }
        };

        if start {
            let drain = Drain {
                worker: Arc::clone(self),
                finished: false,
            };
            self.runtime.spawn(drain.run());
        }

        start
    }

    /// Wait until the worker has no active drain loop.
    pub async fn wait_idle(&self) {
        let mut rx = self.draining.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|draining| !*draining).await;
    }

    async fn process(&self, mut job: Job) {
        let timeout = job.effective_timeout();
        let attempt = job.start_attempt();

        debug!(
            lane = %self.lane,
            job_id = %job.id,
            job = %job.name,
            attempt = job.attempts,
            "Processing job"
        );

        let mut handle = self.runtime.spawn(attempt);
        let outcome = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result.map_err(QueueError::ExecutionFailed),
            Ok(Err(join_error)) => Err(match join_error.try_into_panic() {
                Ok(payload) => QueueError::Panicked(panic_message(payload)),
                Err(join_error) => QueueError::Panicked(join_error.to_string()),
            }),
            Err(_) => {
                handle.abort();
                Err(QueueError::Timeout(timeout))
            }
        };

        match outcome {
            Ok(()) => {
                job.complete();
                debug!(lane = %self.lane, job_id = %job.id, "Job completed");
            }
            Err(err) => {
                warn!(
                    lane = %self.lane,
                    job_id = %job.id,
                    job = %job.name,
                    attempt = job.attempts,
                    error = %err,
                    "Job attempt failed"
                );

                if catch_unwind(AssertUnwindSafe(|| job.report(err))).is_err() {
                    error!(lane = %self.lane, job_id = %job.id, "Job error handler panicked");
                }

                if job.fail() {
                    debug!(
                        lane = %self.lane,
                        job_id = %job.id,
                        retries_remaining = job.retries_remaining,
                        "Requeueing job"
                    );
                    self.lock().jobs.push_back(job);
                } else {
                    error!(
                        lane = %self.lane,
                        job_id = %job.id,
                        job = %job.name,
                        attempts = job.attempts,
                        "Job exhausted its retries and was dropped"
                    );
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The drain loop of one worker.
///
/// Dropping it before the lane empties (a cancelled task or the worker's
/// runtime shutting down) discards the jobs still waiting and clears the
/// draining flag, so the worker reads as idle and the next enqueue starts a
/// fresh loop.
struct Drain {
    worker: Arc<LaneWorker>,
    finished: bool,
}

impl Drain {
    async fn run(mut self) {
        debug!(lane = %self.worker.lane, "Lane draining");

        loop {
            let job = {
                let mut state = self.worker.lock();
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        state.draining = false;
                        self.worker.draining.send_replace(false);
                        self.finished = true;
                        break;
                    }
                }
            };

            self.worker.process(job).await;
        }

        debug!(lane = %self.worker.lane, "Lane idle");
    }
}

impl Drop for Drain {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let stranded = {
            let mut state = self.worker.lock();
            state.draining = false;
            std::mem::take(&mut state.jobs)
        };
        self.worker.draining.send_replace(false);

        warn!(
            lane = %self.worker.lane,
            discarded = stranded.len(),
            "Lane drain stopped before the lane emptied"
        );
    }
}

impl std::fmt::Debug for LaneWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LaneWorker")
            .field("lane", &self.lane)
            .field("queued", &state.jobs.len())
            .field("draining", &state.draining)
            .finish()
    }
}
