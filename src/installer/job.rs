//! Job identity, state and cancellation

use super::package::InstallError;
use crate::catalog::PackageDescriptor;
use crate::repair::RepairReport;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runner-assigned job number, unique per runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a job is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Submitted, waiting for a worker slot
    Pending,
    Downloading,
    Extracting,
    /// Repair scan in progress
    Scanning,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed(_) | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Downloading => write!(f, "downloading"),
            JobState::Extracting => write!(f, "extracting"),
            JobState::Scanning => write!(f, "scanning"),
            JobState::Succeeded => write!(f, "done"),
            JobState::Failed(reason) => write!(f, "failed: {}", reason),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final result of a job. Binary: no partial successes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed(String),
    Cancelled,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

impl From<JobStatus> for JobState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Succeeded => JobState::Succeeded,
            JobStatus::Failed(reason) => JobState::Failed(reason),
            JobStatus::Cancelled => JobState::Cancelled,
        }
    }
}

impl From<InstallError> for JobStatus {
    fn from(err: InstallError) -> Self {
        match err {
            InstallError::Cancelled => JobStatus::Cancelled,
            other => JobStatus::Failed(other.to_string()),
        }
    }
}

/// Reported once per submitted job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job: JobId,
    /// Package id, or "repair"
    pub label: String,
    pub status: JobStatus,
    /// Set for repair jobs that ran to completion
    pub report: Option<RepairReport>,
}

/// One package bound to the runner's destination folder
#[derive(Debug, Clone)]
pub struct InstallJob {
    pub id: JobId,
    pub package: PackageDescriptor,
}

/// Cooperative cancellation shared by every job of a runner.
///
/// Checked before each stage; a stage already running is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), InstallError> {
        if self.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let job_view = flag.clone();
        assert!(job_view.check().is_ok());

        flag.cancel();
        assert!(job_view.is_cancelled());
        assert!(matches!(job_view.check(), Err(InstallError::Cancelled)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Downloading.is_terminal());
        assert!(!JobState::Extracting.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed("x".into()).is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_from_error() {
        assert_eq!(JobStatus::from(InstallError::Cancelled), JobStatus::Cancelled);
        assert_eq!(
            JobStatus::from(InstallError::ToolNotFound),
            JobStatus::Failed(InstallError::ToolNotFound.to_string())
        );
        assert_eq!(
            JobState::from(JobStatus::Failed("HTTP 404".into())),
            JobState::Failed("HTTP 404".into())
        );
    }
}
