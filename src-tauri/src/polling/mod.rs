// Periodic refresh of job snapshots
use crate::api::{ApiError, JobApi};
use crate::models::{EntityId, Job, ReportRecord};
use crate::status::JobStatus;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Latest snapshot plus the dispatch number that produced it.
/// Snapshots are swapped whole; a response older than the applied one is dropped.
pub struct SnapshotStore<T> {
    next_seq: AtomicU64,
    current: Mutex<Option<(u64, T)>>,
}

impl<T: Clone> SnapshotStore<T> {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// Number a request at dispatch time
    pub fn begin(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn replace(&self, seq: u64, snapshot: T) -> bool {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some((applied, _)) if *applied >= seq => false,
            _ => {
                *current = Some((seq, snapshot));
                true
            }
        }
    }

    pub fn latest(&self) -> Option<T> {
        self.current.lock().as_ref().map(|(_, snapshot)| snapshot.clone())
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
    }
}

impl<T: Clone> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives poll results; the desktop shell forwards them as window events
pub trait WatchSink: Send + Sync + 'static {
    fn jobs_updated(&self, _jobs: &[Job]) {}
    fn job_updated(&self, _job: &Job) {}
    fn report_loaded(&self, _job: &Job, _records: &[ReportRecord]) {}
    fn failed(&self, _scope: &str, _err: &ApiError) {}
}

pub struct PollHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `fetch` on the blocking pool every `interval` (first run immediately).
/// Nothing is delivered once the handle is cancelled or dropped.
pub fn spawn_poller<T, F, U, E>(
    interval: Duration,
    store: Arc<SnapshotStore<T>>,
    fetch: F,
    on_update: U,
    on_error: E,
) -> PollHandle
where
    T: Clone + Send + 'static,
    F: Fn() -> Result<T, ApiError> + Send + Sync + 'static,
    U: Fn(T) + Send + 'static,
    E: Fn(ApiError) + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    let fetch = Arc::new(fetch);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if flag.load(Ordering::SeqCst) {
                break;
            }

            let seq = store.begin();
            let fetch = fetch.clone();
            let result = match tokio::task::spawn_blocking(move || fetch()).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Poll fetch #{} aborted: {}", seq, e);
                    continue;
                }
            };

            if flag.load(Ordering::SeqCst) {
                debug!("Discarding poll result #{} after cancel", seq);
                break;
            }

            match result {
                Ok(snapshot) => {
                    if store.replace(seq, snapshot.clone()) {
                        on_update(snapshot);
                    } else {
                        warn!("Dropped stale poll result #{}", seq);
                    }
                }
                Err(e) => on_error(e),
            }
        }
    });

    PollHandle { cancelled, task }
}

fn log_lifecycle(job: &Job) {
    for violation in job.lifecycle_violations() {
        warn!("Inconsistent snapshot: {}", violation);
    }
}

/// Refresh the job list
pub fn watch_jobs(
    api: Arc<dyn JobApi>,
    store: Arc<SnapshotStore<Vec<Job>>>,
    interval: Duration,
    sink: Arc<dyn WatchSink>,
) -> PollHandle {
    let error_sink = sink.clone();
    spawn_poller(
        interval,
        store,
        move || api.list_jobs(),
        move |jobs: Vec<Job>| {
            jobs.iter().for_each(log_lifecycle);
            sink.jobs_updated(&jobs);
        },
        move |e| {
            error!("Job list refresh failed: {}", e);
            error_sink.failed("jobs", &e);
        },
    )
}

/// One detail poll: the job plus its report on the tick it was first fetched
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: Job,
    pub report: Option<Result<Vec<ReportRecord>, ApiError>>,
}

/// Refresh one job; its report is fetched once, as soon as the job has completed
pub fn watch_job(
    api: Arc<dyn JobApi>,
    job_id: EntityId,
    store: Arc<SnapshotStore<JobSnapshot>>,
    interval: Duration,
    sink: Arc<dyn WatchSink>,
) -> PollHandle {
    // Set on delivery, so a report in a dropped snapshot is fetched again
    let report_loaded = Arc::new(AtomicBool::new(false));
    let delivered = report_loaded.clone();
    let error_sink = sink.clone();

    let fetch = move || -> Result<JobSnapshot, ApiError> {
        let job = api.get_job(&job_id)?;
        let report = (job.status.is(JobStatus::Completed) && !report_loaded.load(Ordering::SeqCst))
            .then(|| api.get_report(&job.job_id));
        Ok(JobSnapshot { job, report })
    };

    spawn_poller(
        interval,
        store,
        fetch,
        move |snapshot: JobSnapshot| {
            log_lifecycle(&snapshot.job);
            sink.job_updated(&snapshot.job);
            match &snapshot.report {
                Some(Ok(records)) => {
                    delivered.store(true, Ordering::SeqCst);
                    sink.report_loaded(&snapshot.job, records);
                }
                Some(Err(e)) => {
                    error!("Report fetch for job {} failed: {}", snapshot.job.job_id, e);
                    sink.failed("report", e);
                }
                None => {}
            }
        },
        move |e| {
            error!("Job refresh failed: {}", e);
            error_sink.failed("job", &e);
        },
    )
}

/// Live subscriptions keyed by an id handed to the front-end
#[derive(Default)]
pub struct PollerRegistry {
    handles: Mutex<HashMap<String, PollHandle>>,
}

impl PollerRegistry {
    pub fn insert(&self, handle: PollHandle) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.handles.lock().insert(id.clone(), handle);
        id
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.handles.lock().remove(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let handles: Vec<PollHandle> = self.handles.lock().drain().map(|(_, h)| h).collect();
        let count = handles.len();
        for handle in &handles {
            handle.cancel();
        }
        if count > 0 {
            debug!("Cancelled {} pollers", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::fake::FakeApi;
    use crate::models::job::fixtures;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const TICK: Duration = Duration::from_millis(10);

    #[derive(Default)]
    struct Recorder {
        jobs: AtomicUsize,
        job: AtomicUsize,
        reports: AtomicUsize,
        errors: Mutex<Vec<String>>,
    }

    impl WatchSink for Recorder {
        fn jobs_updated(&self, _jobs: &[Job]) {
            self.jobs.fetch_add(1, Ordering::SeqCst);
        }
        fn job_updated(&self, _job: &Job) {
            self.job.fetch_add(1, Ordering::SeqCst);
        }
        fn report_loaded(&self, _job: &Job, _records: &[ReportRecord]) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }
        fn failed(&self, scope: &str, err: &ApiError) {
            self.errors.lock().push(format!("{scope}: {err}"));
        }
    }

    #[test]
    fn test_store_drops_stale_responses() {
        let store = SnapshotStore::new();
        let older = store.begin();
        let newer = store.begin();

        assert!(store.replace(newer, vec!["fresh"]));
        assert!(!store.replace(older, vec!["stale"]));
        assert_eq!(store.latest(), Some(vec!["fresh"]));

        store.clear();
        assert_eq!(store.latest(), None);
    }

    #[tokio::test]
    async fn test_poller_updates_until_cancelled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let delivered = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(SnapshotStore::new());

        let fetch_counter = counter.clone();
        let seen = delivered.clone();
        let handle = spawn_poller(
            TICK,
            store.clone(),
            move || Ok(fetch_counter.fetch_add(1, Ordering::SeqCst)),
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );

        tokio::time::sleep(TICK * 8).await;
        handle.cancel();
        let after_cancel = delivered.load(Ordering::SeqCst);
        assert!(after_cancel >= 2, "only {after_cancel} updates");
        assert!(store.latest().is_some());

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(delivered.load(Ordering::SeqCst), after_cancel);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_result_after_cancel_is_discarded() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let seen = delivered.clone();
        let handle = spawn_poller(
            TICK,
            Arc::new(SnapshotStore::new()),
            || {
                std::thread::sleep(Duration::from_millis(50));
                Ok(1u8)
            },
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        );

        tokio::time::sleep(TICK).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_errors_are_reported() {
        let api = Arc::new(FakeApi::default());
        *api.fail_with.lock() = Some(ApiError::Unauthorized(401));
        let sink = Arc::new(Recorder::default());

        let handle = watch_jobs(api, Arc::new(SnapshotStore::new()), TICK, sink.clone());
        tokio::time::sleep(TICK * 3).await;
        handle.cancel();

        let errors = sink.errors.lock().clone();
        assert!(!errors.is_empty());
        assert_eq!(errors[0], "jobs: not authorized (HTTP 401)");
        assert_eq!(sink.jobs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_report_fetched_once_after_completion() {
        let api = Arc::new(FakeApi::default());
        api.jobs.lock().push(fixtures::job("42", JobStatus::Completed));
        api.reports
            .lock()
            .push(ReportRecord::from(json!({ "cell_count": 5000 })));
        let sink = Arc::new(Recorder::default());
        let store = Arc::new(SnapshotStore::new());

        let handle = watch_job(
            api.clone(),
            EntityId::new("42"),
            store.clone(),
            TICK,
            sink.clone(),
        );
        tokio::time::sleep(TICK * 8).await;
        handle.cancel();

        assert!(sink.job.load(Ordering::SeqCst) >= 2);
        assert_eq!(sink.reports.load(Ordering::SeqCst), 1);
        let report_calls = api.calls().iter().filter(|c| c.starts_with("report")).count();
        assert_eq!(report_calls, 1);
        assert_eq!(
            store.latest().map(|snapshot| snapshot.job.job_id),
            Some(EntityId::new("42"))
        );
    }

    #[tokio::test]
    async fn test_running_job_skips_report() {
        let api = Arc::new(FakeApi::default());
        api.jobs.lock().push(fixtures::job("7", JobStatus::RunningRouting));
        let sink = Arc::new(Recorder::default());

        let handle = watch_job(
            api.clone(),
            EntityId::new("7"),
            Arc::new(SnapshotStore::new()),
            TICK,
            sink.clone(),
        );
        tokio::time::sleep(TICK * 4).await;
        handle.cancel();

        assert_eq!(sink.reports.load(Ordering::SeqCst), 0);
        assert!(api.calls().iter().all(|c| c.starts_with("get")));
    }

    #[tokio::test]
    async fn test_registry_cancel_all() {
        let registry = PollerRegistry::default();
        let store: Arc<SnapshotStore<u8>> = Arc::new(SnapshotStore::new());
        let first = registry.insert(spawn_poller(TICK, store.clone(), || Ok(1), |_| {}, |_| {}));
        registry.insert(spawn_poller(TICK, store, || Ok(2), |_| {}, |_| {}));

        assert_eq!(registry.len(), 2);
        assert!(registry.cancel(&first));
        assert!(!registry.cancel(&first));
        assert_eq!(registry.cancel_all(), 1);
        assert!(registry.is_empty());
    }
}
