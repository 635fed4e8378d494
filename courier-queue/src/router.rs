//! Routes jobs onto lanes and manages lane worker lifetimes.

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobId, clamp_retries};
use crate::worker::LaneWorker;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Router from requested lane names to lazily created lane workers.
///
/// A worker is created on the first job for its lane and dropped from the
/// active set once its lane drains with nothing new enqueued.
///
/// Workers run on the router's runtime: the one set with
/// [`QueueRouter::set_runtime`], otherwise the runtime current when the
/// router was configured or first used.
#[derive(Default)]
pub struct QueueRouter {
    config: RwLock<Option<Arc<QueueConfig>>>,
    workers: Arc<DashMap<String, Arc<LaneWorker>>>,
    runtime: RwLock<Option<Handle>>,
}

impl QueueRouter {
    /// Create an unconfigured router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with a lane configuration.
    pub fn with_config(config: QueueConfig) -> Self {
        let router = Self::new();
        router.configure(config);
        router
    }

    /// Install or replace the lane configuration.
    pub fn configure(&self, config: QueueConfig) {
        info!(
            fallback = %config.fallback_lane,
            lanes = ?config.lanes,
            default_timeout = ?config.default_timeout,
            "Configuring queue lanes"
        );
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(config));

        if let Ok(current) = Handle::try_current() {
            let mut runtime = self.runtime.write().unwrap_or_else(PoisonError::into_inner);
            if runtime.is_none() {
                *runtime = Some(current);
            }
        }
    }

    /// Pin lane workers to a runtime.
    pub fn set_runtime(&self, runtime: Handle) {
        *self.runtime.write().unwrap_or_else(PoisonError::into_inner) = Some(runtime);
    }

    /// Runtime lane workers run on, if one is known yet.
    pub fn runtime(&self) -> Option<Handle> {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn resolve_runtime(&self) -> QueueResult<Handle> {
        if let Some(runtime) = self.runtime() {
            return Ok(runtime);
        }

        let current = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(self
            .runtime
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(current)
            .clone())
    }

    /// Current lane configuration.
    pub fn config(&self) -> Option<Arc<QueueConfig>> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a configuration has been installed.
    pub fn is_configured(&self) -> bool {
        self.config().is_some()
    }

    /// Route a job onto its lane.
    ///
    /// Unset or unknown lanes resolve to the fallback lane. When no
    /// configuration is installed the job's error continuation receives
    /// [`QueueError::NotConfigured`], the job is dropped, and the same error
    /// is returned. [`QueueError::NoRuntime`] is handled the same way.
    pub fn submit(&self, requested_lane: Option<&str>, mut job: Job) -> QueueResult<JobId> {
        let Some(config) = self.config() else {
            warn!(job = %job.name, "Queued job submitted before queue configuration");
            job.report(QueueError::NotConfigured);
            return Err(QueueError::NotConfigured);
        };

        let runtime = match self.resolve_runtime() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(job = %job.name, "No runtime available for lane workers");
                job.report(QueueError::NoRuntime);
                return Err(err);
            }
        };

        let lane = config.resolve_lane(requested_lane).to_string();
        if requested_lane.is_some_and(|requested| requested != lane) {
            debug!(
                requested = requested_lane.unwrap_or_default(),
                lane = %lane,
                "Unknown lane, using fallback"
            );
        }

        job.lane = lane.clone();
        job.timeout.get_or_insert(config.default_timeout);
        job.retries_remaining = clamp_retries(job.retries_remaining);
        let job_id = job.id;

        // Enqueue while holding the entry so disposal cannot race a new job.
        let mut created = false;
        let worker = self.workers.entry(lane.clone()).or_insert_with(|| {
            created = true;
            Arc::new(LaneWorker::new(lane.clone(), runtime.clone()))
        });
        worker.enqueue(job);
        if created {
            debug!(lane = %lane, "Created lane worker");
            self.watch_for_disposal(&runtime, Arc::clone(worker.value()));
        }

        Ok(job_id)
    }

    /// Names of lanes with a live worker, sorted.
    pub fn active_lanes(&self) -> Vec<String> {
        let mut lanes: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        lanes.sort();
        lanes
    }

    /// Live worker for a lane, if any.
    pub fn worker(&self, lane: &str) -> Option<Arc<LaneWorker>> {
        self.workers.get(lane).map(|w| Arc::clone(w.value()))
    }

    /// Wait until every lane is idle, including lanes that receive jobs
    /// from other lanes while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let workers: Vec<Arc<LaneWorker>> =
                self.workers.iter().map(|e| Arc::clone(e.value())).collect();

            if workers.iter().all(|worker| worker.is_idle()) {
                return;
            }

            for worker in workers {
                worker.wait_idle().await;
            }
        }
    }

    fn watch_for_disposal(&self, runtime: &Handle, worker: Arc<LaneWorker>) {
        let workers = Arc::clone(&self.workers);

        runtime.spawn(async move {
            loop {
                worker.wait_idle().await;

                let removed = workers.remove_if(worker.lane(), |_, current| {
                    Arc::ptr_eq(current, &worker) && current.is_idle()
                });
                if removed.is_some() {
                    debug!(lane = %worker.lane(), "Disposed idle lane worker");
                    return;
                }

                let still_registered = workers
                    .get(worker.lane())
                    .is_some_and(|current| Arc::ptr_eq(current.value(), &worker));
                if !still_registered {
                    return;
                }
            }
        });
    }
}

impl std::fmt::Debug for QueueRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRouter")
            .field("config", &self.config())
            .field("active_lanes", &self.active_lanes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn lane_recorder(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> Job {
        Job::new(label, move || {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(label.to_string());
                Ok(())
            }
        })
    }

    async fn wait_until_disposed(router: &QueueRouter) {
        for _ in 0..100 {
            if router.active_lanes().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("lanes were never disposed: {:?}", router.active_lanes());
    }

    #[tokio::test]
    async fn test_unconfigured_router_reports_error() {
        let router = QueueRouter::new();
        let reported = Arc::new(AtomicU32::new(0));
        let seen = reported.clone();

        let job = Job::new("orphan", || async { Ok(()) }).with_error_handler(move |err| {
            assert!(matches!(err, QueueError::NotConfigured));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let result = router.submit(Some("emails"), job);

        assert!(matches!(result, Err(QueueError::NotConfigured)));
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(router.active_lanes().is_empty());
    }

    #[test]
    fn test_submit_without_runtime_reports_error() {
        let router = QueueRouter::with_config(QueueConfig::new("default"));
        assert!(router.runtime().is_none());
        let reported = Arc::new(AtomicU32::new(0));
        let seen = reported.clone();

        let job = Job::new("stranded", || async { Ok(()) }).with_error_handler(move |err| {
            assert!(matches!(err, QueueError::NoRuntime));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let result = router.submit(None, job);

        assert!(matches!(result, Err(QueueError::NoRuntime)));
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(router.active_lanes().is_empty());
    }

    #[tokio::test]
    async fn test_workers_stay_on_router_runtime() {
        let router = Arc::new(QueueRouter::with_config(QueueConfig::new("default")));
        assert!(router.runtime().is_some());
        let log = Arc::new(Mutex::new(Vec::new()));

        let foreign = Arc::clone(&router);
        let foreign_log = log.clone();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                foreign
                    .submit(None, lane_recorder(foreign_log, "nested"))
                    .unwrap();
            });
        })
        .join()
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), router.wait_idle())
            .await
            .expect("lane never drained");
        assert_eq!(*log.lock().unwrap(), vec!["nested"]);

        router.submit(None, lane_recorder(log.clone(), "host")).unwrap();
        router.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["nested", "host"]);
        wait_until_disposed(&router).await;
    }

    #[tokio::test]
    async fn test_unknown_lane_uses_fallback() {
        let router = QueueRouter::with_config(QueueConfig::new("default").with_lane("emails"));
        let log = Arc::new(Mutex::new(Vec::new()));

        router
            .submit(Some("reports"), lane_recorder(log.clone(), "r"))
            .unwrap();
        assert_eq!(router.active_lanes(), vec!["default"]);

        router.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["r"]);
    }

    #[tokio::test]
    async fn test_lanes_are_created_lazily() {
        let router = QueueRouter::with_config(QueueConfig::new("default").with_lane("emails"));
        assert!(router.active_lanes().is_empty());

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(rx)));
        let blocked = Job::new("blocked", move || {
            let rx = gate.lock().unwrap().take();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                Ok(())
            }
        });

        router.submit(Some("emails"), blocked).unwrap();
        assert_eq!(router.active_lanes(), vec!["emails"]);
        assert!(router.worker("emails").is_some());
        assert!(router.worker("default").is_none());

        tx.send(()).unwrap();
        router.wait_idle().await;
        wait_until_disposed(&router).await;
        assert!(router.worker("emails").is_none());
    }

    #[tokio::test]
    async fn test_default_timeout_and_retry_clamp_applied() {
        let router = QueueRouter::with_config(
            QueueConfig::new("default").with_default_timeout(Duration::from_secs(5)),
        );
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();

        let mut job = Job::new("fails", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>("nope".into())
            }
        });
        job.retries_remaining = 1_000;

        router.submit(None, job).unwrap();
        router.wait_idle().await;

        assert_eq!(runs.load(Ordering::SeqCst), 31);
    }

    #[tokio::test]
    async fn test_lane_recreated_after_disposal() {
        let router = QueueRouter::with_config(QueueConfig::new("default"));
        let log = Arc::new(Mutex::new(Vec::new()));

        router.submit(None, lane_recorder(log.clone(), "first")).unwrap();
        router.wait_idle().await;
        wait_until_disposed(&router).await;

        router.submit(None, lane_recorder(log.clone(), "second")).unwrap();
        router.wait_idle().await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_lanes_drain_independently() {
        let router = QueueRouter::with_config(QueueConfig::new("default").with_lane("emails"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(rx)));
        let slow_log = log.clone();
        let slow = Job::new("slow", move || {
            let rx = gate.lock().unwrap().take();
            let log = slow_log.clone();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
                log.lock().unwrap().push("slow".to_string());
                Ok(())
            }
        });

        router.submit(None, slow).unwrap();
        router
            .submit(Some("emails"), lane_recorder(log.clone(), "email"))
            .unwrap();

        for _ in 0..100 {
            if !log.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["email"]);

        tx.send(()).unwrap();
        router.wait_idle().await;
        assert_eq!(*log.lock().unwrap(), vec!["email", "slow"]);
    }
}
