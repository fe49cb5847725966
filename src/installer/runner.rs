//! Concurrent job execution.
//!
//! Each submitted job runs as its own tokio task; a semaphore caps how many
//! run at once. A supervisor task awaits every job's handle and is the only
//! place an outcome is reported, so every job is reported exactly once,
//! whether it returns, panics or is aborted. Running jobs are tracked in a
//! registry behind a single mutex.

use super::job::{CancelFlag, InstallJob, JobId, JobOutcome, JobState, JobStatus};
use super::package::PackageInstaller;
use super::temp::sweep_temp_dir;
use crate::catalog::PackageDescriptor;
use crate::repair::{RepairReport, RepairScanner, ScanOptions};

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Grace period used by the CLI on Ctrl-C
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Progress notifications from running jobs
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    State {
        job: JobId,
        label: String,
        state: JobState,
    },
    Finished(JobOutcome),
}

/// What a job's task resolves to
type JobResult = (JobStatus, Option<RepairReport>);

struct Registered {
    label: String,
    abort: AbortHandle,
}

struct Shared {
    registry: Mutex<HashMap<JobId, Registered>>,
    cancel: CancelFlag,
    events: mpsc::UnboundedSender<RunnerEvent>,
    temp_dir: PathBuf,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, HashMap<JobId, Registered>> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit_state(&self, job: JobId, label: &str, state: JobState) {
        let _ = self.events.send(RunnerEvent::State {
            job,
            label: label.to_string(),
            state,
        });
    }

    fn finish(&self, outcome: JobOutcome) {
        self.registry().remove(&outcome.job);
        let _ = self.events.send(RunnerEvent::Finished(outcome));
    }

    /// Poll until no job is registered, or until `deadline` passes
    async fn wait_idle(&self, deadline: Option<Instant>) {
        loop {
            let idle = self.registry().is_empty();
            if idle || deadline.is_some_and(|d| Instant::now() >= d) {
                return;
            }
            tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
        }
    }
}

/// Runs install and repair jobs against one game folder
pub struct JobRunner {
    shared: Arc<Shared>,
    installer: Option<Arc<PackageInstaller>>,
    permits: Arc<Semaphore>,
    events: mpsc::UnboundedReceiver<RunnerEvent>,
    next_id: u64,
    submitted: usize,
    finished: usize,
}

impl JobRunner {
    pub fn new(installer: PackageInstaller) -> Self {
        let config = installer.config();
        let temp_dir = config.temp_dir.clone();
        let workers = config.max_concurrent_jobs;
        Self::build(Some(installer), temp_dir, workers)
    }

    /// Runner for repair scans only; no HTTP client or 7z lookup is set up.
    ///
    /// Install jobs submitted to it fail immediately.
    pub fn scan_only(temp_dir: impl Into<PathBuf>) -> Self {
        Self::build(None, temp_dir.into(), 1)
    }

    fn build(installer: Option<PackageInstaller>, temp_dir: PathBuf, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry: Mutex::new(HashMap::new()),
            cancel: CancelFlag::new(),
            events: tx,
            temp_dir,
        });

        Self {
            shared,
            installer: installer.map(Arc::new),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            events: rx,
            next_id: 0,
            submitted: 0,
            finished: 0,
        }
    }

    fn allocate(&mut self) -> JobId {
        self.next_id += 1;
        self.submitted += 1;
        JobId(self.next_id)
    }

    /// Spawn `work` as a tracked job, plus the supervisor that reports it
    fn spawn<F>(&mut self, label: String, work: impl FnOnce(JobId) -> F) -> JobId
    where
        F: Future<Output = JobResult> + Send + 'static,
    {
        let id = self.allocate();
        self.shared.emit_state(id, &label, JobState::Pending);

        let task = tokio::spawn(work(id));
        self.shared.registry().insert(
            id,
            Registered {
                label: label.clone(),
                abort: task.abort_handle(),
            },
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let (status, report) = match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => (JobStatus::Cancelled, None),
                Err(e) => {
                    error!("[{}] Job panicked: {}", label, e);
                    (JobStatus::Failed(format!("Job panicked: {}", e)), None)
                }
            };
            shared.finish(JobOutcome {
                job: id,
                label,
                status,
                report,
            });
        });
        id
    }

    /// Start installing `package` into the runner's game folder
    pub fn submit(&mut self, package: PackageDescriptor) -> JobId {
        let shared = Arc::clone(&self.shared);
        let installer = self.installer.clone();
        let permits = Arc::clone(&self.permits);
        let label = package.id.clone();

        self.spawn(label.clone(), move |id| async move {
            let Some(installer) = installer else {
                error!("[{}] Runner was built for repair scans only", label);
                return (JobStatus::Failed("No installer configured".to_string()), None);
            };
            let job = InstallJob { id, package };
            let _permit = permits.acquire_owned().await;

            let notify = |state: JobState| shared.emit_state(job.id, &label, state);
            let status = match installer.install(&job.package, &shared.cancel, &notify).await {
                Ok(()) => JobStatus::Succeeded,
                Err(e) => {
                    let status = JobStatus::from(e);
                    if let JobStatus::Failed(reason) = &status {
                        error!("[{}] {}", label, reason);
                    }
                    status
                }
            };
            (status, None)
        })
    }

    /// Start a repair scan of `folder`; the outcome carries the report
    pub fn submit_repair(&mut self, folder: PathBuf, options: ScanOptions) -> JobId {
        let shared = Arc::clone(&self.shared);
        let permits = Arc::clone(&self.permits);
        let label = "repair".to_string();

        self.spawn(label.clone(), move |id| async move {
            let _permit = permits.acquire_owned().await;
            if shared.cancel.is_cancelled() {
                return (JobStatus::Cancelled, None);
            }

            shared.emit_state(id, &label, JobState::Scanning);
            let scan = tokio::task::spawn_blocking(move || RepairScanner::new(options).scan(&folder)).await;
            match scan {
                Ok(Ok(report)) => (JobStatus::Succeeded, Some(report)),
                Ok(Err(e)) => {
                    error!("[{}] {}", label, e);
                    (JobStatus::Failed(e.to_string()), None)
                }
                Err(e) => (JobStatus::Failed(format!("Scan task failed: {}", e)), None),
            }
        })
    }

    /// Handle for cancelling from another task (e.g. a Ctrl-C listener)
    pub fn canceller(&self) -> CancelHandle {
        CancelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    /// Next event, or `None` once every submitted job has finished
    pub async fn next_event(&mut self) -> Option<RunnerEvent> {
        if self.finished >= self.submitted {
            return None;
        }
        let event = self.events.recv().await?;
        if matches!(event, RunnerEvent::Finished(_)) {
            self.finished += 1;
        }
        Some(event)
    }

    /// Wait until every submitted job is terminal; outcomes in completion order
    pub async fn wait_all(&mut self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.next_event().await {
            if let RunnerEvent::Finished(outcome) = event {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

/// Cancels every job of one runner
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Ask every job to stop, wait up to `grace`, then abort the rest and
    /// sweep leftover temp files. Returns the number of jobs still running
    /// at the deadline.
    ///
    /// Aborted jobs are reported `Cancelled` by their supervisors. A job that
    /// completes before its abort lands keeps its own outcome.
    pub async fn cancel_all(&self, grace: Duration) -> usize {
        info!("Cancelling all jobs");
        self.shared.cancel.cancel();
        self.shared.wait_idle(Some(Instant::now() + grace)).await;

        let aborted = {
            let registry = self.shared.registry();
            for registered in registry.values() {
                warn!("[{}] Still running after grace period, aborting", registered.label);
                registered.abort.abort();
            }
            registry.len()
        };

        // Aborted futures are dropped before their supervisors report, which
        // releases their temp guards
        self.shared.wait_idle(None).await;

        let swept = sweep_temp_dir(&self.shared.temp_dir);
        if !swept.is_empty() {
            info!("Removed {} leftover temp file(s)", swept.len());
        }
        aborted
    }
}
