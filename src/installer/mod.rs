//! Package installation
//!
//! A job moves through these stages:
//! 1. Pending:      waiting for a worker slot
//! 2. Downloading:  every file staged in the temp directory (all parts, in order)
//! 3. Extracting:   zip natively, split 7z volumes with the external tool
//! 4. Terminal:     Succeeded, Failed(reason) or Cancelled
//!
//! Staged files are removed whatever the outcome.

pub mod config;
pub mod job;
pub mod package;
pub mod runner;
pub mod temp;

pub use config::{ConfigError, InstallConfig};
pub use job::{CancelFlag, InstallJob, JobId, JobOutcome, JobState, JobStatus};
pub use package::{InstallError, PackageInstaller};
pub use runner::{CancelHandle, JobRunner, RunnerEvent, DEFAULT_CANCEL_GRACE};

/// Per-batch totals
#[derive(Debug, Default, Clone)]
pub struct InstallStats {
    pub succeeded: Vec<String>,
    /// (package id, reason)
    pub failed: Vec<(String, String)>,
    pub cancelled: Vec<String>,
}

impl InstallStats {
    pub fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match &outcome.status {
                JobStatus::Succeeded => stats.succeeded.push(outcome.label.clone()),
                JobStatus::Failed(reason) => stats
                    .failed
                    .push((outcome.label.clone(), reason.clone())),
                JobStatus::Cancelled => stats.cancelled.push(outcome.label.clone()),
            }
        }
        stats.succeeded.sort();
        stats.failed.sort();
        stats.cancelled.sort();
        stats
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}
