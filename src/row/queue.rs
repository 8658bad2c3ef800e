// Sequential row task queue
//
// One worker drains a FIFO of repository names, running at most one job at
// a time and pausing a fixed delay after each completion. Manual requests
// may jump to the front.

use super::fsm::RowEvent;
use super::store::RowStateStore;
use super::RowStatus;
use crate::error::PressdeckError;
use crate::install::{ActivationOutcome, InstallOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Server-side operations the row jobs call into
#[async_trait]
pub trait RowBackend: Send + Sync {
    async fn row_status(&self, repo: &str) -> Result<RowStatus, PressdeckError>;

    async fn install(&self, repo: &str, activate: bool) -> Result<InstallOutcome, PressdeckError>;

    async fn activate(&self, plugin_file: &str) -> Result<ActivationOutcome, PressdeckError>;
}

/// Work performed for one queued repository
#[async_trait]
pub trait QueueJob: Send + Sync + 'static {
    async fn run(&self, repo: &str);
}

/// Refreshes a row from the server's status payload
pub struct StatusCheckJob {
    backend: Arc<dyn RowBackend>,
    store: Arc<RowStateStore>,
}

impl StatusCheckJob {
    pub fn new(backend: Arc<dyn RowBackend>, store: Arc<RowStateStore>) -> Self {
        Self { backend, store }
    }
}

#[async_trait]
impl QueueJob for StatusCheckJob {
    async fn run(&self, repo: &str) {
        let ticket = self.store.begin_request(repo);
        self.store.apply_event(repo, RowEvent::CheckStart);

        let event = match self.backend.row_status(repo).await {
            // An error without a definitive answer is a failed check
            Ok(status) if status.is_plugin.is_none() && status.error.is_some() => RowEvent::CheckFail {
                error: status.error,
            },
            Ok(status) => RowEvent::StatusRefresh(status.into()),
            Err(e) => RowEvent::CheckFail {
                error: Some(e.to_string()),
            },
        };
        self.store.apply_response(&ticket, event);
    }
}

/// Installs a row's plugin
pub struct InstallJob {
    backend: Arc<dyn RowBackend>,
    store: Arc<RowStateStore>,
    activate: bool,
}

impl InstallJob {
    pub fn new(backend: Arc<dyn RowBackend>, store: Arc<RowStateStore>, activate: bool) -> Self {
        Self {
            backend,
            store,
            activate,
        }
    }
}

#[async_trait]
impl QueueJob for InstallJob {
    async fn run(&self, repo: &str) {
        let ticket = self.store.begin_request(repo);
        self.store.apply_event(repo, RowEvent::InstallStart);

        let event = match self.backend.install(repo, self.activate).await {
            Ok(outcome) => RowEvent::InstallSuccess {
                activated: outcome.activated,
                plugin_file: Some(outcome.plugin_file),
            },
            Err(e) => RowEvent::InstallFail {
                error: Some(e.to_string()),
            },
        };
        self.store.apply_response(&ticket, event);
    }
}

/// Activates an installed row using its known plugin file
pub struct ActivateJob {
    backend: Arc<dyn RowBackend>,
    store: Arc<RowStateStore>,
}

impl ActivateJob {
    pub fn new(backend: Arc<dyn RowBackend>, store: Arc<RowStateStore>) -> Self {
        Self { backend, store }
    }
}

#[async_trait]
impl QueueJob for ActivateJob {
    async fn run(&self, repo: &str) {
        let Some(plugin_file) = self.store.get(repo).plugin_file else {
            self.store.apply_event(
                repo,
                RowEvent::ActivateFail {
                    error: Some("plugin file unknown".to_string()),
                },
            );
            return;
        };

        let ticket = self.store.begin_request(repo);
        self.store.apply_event(repo, RowEvent::ActivateStart);

        let event = match self.backend.activate(&plugin_file).await {
            Ok(_) => RowEvent::ActivateSuccess,
            Err(e) => RowEvent::ActivateFail {
                error: Some(e.to_string()),
            },
        };
        self.store.apply_response(&ticket, event);
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    in_flight: Option<String>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
    idle: Notify,
    delay: Duration,
}

impl Shared {
    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.in_flight.is_none()
    }
}

/// Single-worker queue of repository jobs
pub struct RowQueue {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl RowQueue {
    /// Start a worker running `job` for each queued repository
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(job: Arc<dyn QueueJob>, delay: Duration) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wake: Notify::new(),
            idle: Notify::new(),
            delay,
        });
        let worker = tokio::spawn(Self::work(shared.clone(), job));
        Self { shared, worker }
    }

    async fn work(shared: Arc<Shared>, job: Arc<dyn QueueJob>) {
        loop {
            let next = {
                let mut state = shared.state.lock();
                if state.closed {
                    break;
                }
                let next = state.pending.pop_front();
                state.in_flight = next.clone();
                next
            };

            let Some(repo) = next else {
                shared.idle.notify_waiters();
                shared.wake.notified().await;
                continue;
            };

            tracing::debug!(repo = %repo, "Running queued job");
            job.run(&repo).await;
            shared.state.lock().in_flight = None;

            if shared.is_idle() {
                shared.idle.notify_waiters();
            }
            if !shared.delay.is_zero() {
                tokio::time::sleep(shared.delay).await;
            }
        }
    }

    /// Append a repository; returns `false` if it is already pending
    pub fn enqueue(&self, repo: &str) -> bool {
        let mut state = self.shared.state.lock();
        if state.pending.iter().any(|r| r == repo) {
            return false;
        }
        state.pending.push_back(repo.to_string());
        drop(state);
        self.shared.wake.notify_one();
        true
    }

    /// Put a repository at the head of the queue, moving it if pending
    pub fn enqueue_front(&self, repo: &str) {
        let mut state = self.shared.state.lock();
        state.pending.retain(|r| r != repo);
        state.pending.push_front(repo.to_string());
        drop(state);
        self.shared.wake.notify_one();
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until nothing is pending or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stop after the current job; pending entries are dropped
    pub fn shutdown(&self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

impl Drop for RowQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DetectionError, InstallError, InstallFailure};
    use crate::row::FsmState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    #[async_trait]
    impl QueueJob for Recorder {
        async fn run(&self, repo: &str) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.seen.lock().push(repo.to_string());
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_fifo_with_front_insert_one_at_a_time() {
        let recorder = Arc::new(Recorder::default());
        let queue = RowQueue::spawn(recorder.clone(), Duration::from_millis(250));

        assert!(queue.enqueue("a"));
        assert!(queue.enqueue("b"));
        assert!(!queue.enqueue("a"));
        assert!(queue.enqueue("c"));
        queue.enqueue_front("c");
        queue.enqueue_front("z");

        queue.wait_idle().await;
        assert_eq!(*recorder.seen.lock(), vec!["z", "c", "a", "b"]);
        assert_eq!(recorder.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_completions() {
        let recorder = Arc::new(Recorder::default());
        let queue = RowQueue::spawn(recorder.clone(), Duration::from_millis(250));
        let started = tokio::time::Instant::now();

        for repo in ["a", "b", "c"] {
            queue.enqueue(repo);
        }
        queue.wait_idle().await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(queue.is_empty());
    }

    struct FakeBackend {
        status: Result<RowStatus, DetectionError>,
        install_ok: bool,
    }

    fn status(repo: &str, is_plugin: Option<bool>) -> RowStatus {
        RowStatus {
            repo_name: repo.to_string(),
            is_plugin,
            is_installed: Some(false),
            is_active: Some(false),
            plugin_file: None,
            settings_url: None,
            checking: false,
            installing: false,
            error: None,
        }
    }

    #[async_trait]
    impl RowBackend for FakeBackend {
        async fn row_status(&self, _repo: &str) -> Result<RowStatus, PressdeckError> {
            self.status.clone().map_err(PressdeckError::from)
        }

        async fn install(&self, repo: &str, activate: bool) -> Result<InstallOutcome, PressdeckError> {
            if !self.install_ok {
                return Err(InstallFailure::from(InstallError::NoPluginFile).into());
            }
            Ok(InstallOutcome {
                plugin_dir: repo.into(),
                plugin_file: format!("{repo}/{repo}.php"),
                activated: activate,
                logs: vec![],
                activation_error: None,
            })
        }

        async fn activate(&self, plugin_file: &str) -> Result<ActivationOutcome, PressdeckError> {
            Ok(ActivationOutcome {
                activated: true,
                plugin_file: plugin_file.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn status_job_applies_refresh_or_failure() {
        let store = Arc::new(RowStateStore::new());
        let ok = StatusCheckJob::new(
            Arc::new(FakeBackend {
                status: Ok(status("seo", Some(true))),
                install_ok: true,
            }),
            store.clone(),
        );
        ok.run("seo").await;
        assert_eq!(store.get("seo").fsm_state, FsmState::Installable);

        let failing = StatusCheckJob::new(
            Arc::new(FakeBackend {
                status: Err(DetectionError::RateLimited),
                install_ok: true,
            }),
            store.clone(),
        );
        failing.run("seo").await;
        let row = store.get("seo");
        assert_eq!(row.fsm_state, FsmState::Error);
        assert!(row.error.unwrap().contains("Rate limited"));
    }

    #[tokio::test]
    async fn status_error_without_answer_fails_the_check() {
        let store = Arc::new(RowStateStore::new());
        let mut rate_limited = status("seo", None);
        rate_limited.error = Some("Rate limited by the content source".into());
        let job = StatusCheckJob::new(
            Arc::new(FakeBackend {
                status: Ok(rate_limited),
                install_ok: true,
            }),
            store.clone(),
        );

        job.run("seo").await;
        let row = store.get("seo");
        assert_eq!(row.fsm_state, FsmState::Error);
        assert_eq!(row.error.as_deref(), Some("Rate limited by the content source"));

        let plain = StatusCheckJob::new(
            Arc::new(FakeBackend {
                status: Ok(status("seo", None)),
                install_ok: true,
            }),
            store.clone(),
        );
        plain.run("seo").await;
        let row = store.get("seo");
        assert_eq!(row.fsm_state, FsmState::Unknown);
        assert_eq!(row.error, None);
    }

    #[tokio::test]
    async fn install_then_activate_jobs() {
        let store = Arc::new(RowStateStore::new());
        let backend = Arc::new(FakeBackend {
            status: Ok(status("seo", Some(true))),
            install_ok: true,
        });

        InstallJob::new(backend.clone(), store.clone(), false).run("seo").await;
        let row = store.get("seo");
        assert_eq!(row.fsm_state, FsmState::DownloadedInactive);
        assert_eq!(row.plugin_file.as_deref(), Some("seo/seo.php"));

        ActivateJob::new(backend, store.clone()).run("seo").await;
        assert_eq!(store.get("seo").fsm_state, FsmState::DownloadedActive);
    }

    #[tokio::test]
    async fn failed_install_lands_in_error() {
        let store = Arc::new(RowStateStore::new());
        let backend = Arc::new(FakeBackend {
            status: Ok(status("seo", Some(true))),
            install_ok: false,
        });

        InstallJob::new(backend, store.clone(), true).run("seo").await;
        let row = store.get("seo");
        assert_eq!(row.fsm_state, FsmState::Error);
        assert!(!row.installing);
    }
}
