//! Installation configuration
//!
//! Runtime settings for one batch of package installs. Built by the CLI from
//! the persisted [`Settings`](crate::settings::Settings) plus command-line
//! overrides; never written to disk.

use crate::archive::DEFAULT_EXTRACT_TIMEOUT;
use crate::downloaders::{FetchLimits, MirrorPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of jobs allowed to run at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Multi-part sources with fewer urls than this are considered incomplete
pub const DEFAULT_MIN_MULTIPART_PARTS: usize = 2;

/// Configuration for package installation
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Game folder packages are extracted into
    pub destination: PathBuf,

    /// Where downloads are staged before extraction
    pub temp_dir: PathBuf,

    /// Download size and timeout limits
    pub limits: FetchLimits,

    /// Mirror rewrites for primary links
    pub mirrors: MirrorPolicy,

    /// Wall-clock limit for one 7z run
    pub extract_timeout: Duration,

    /// Minimum number of parts a multi-part source must list
    pub min_multipart_parts: usize,

    /// User-configured 7z binary, tried before the system search
    pub sevenzip_path: Option<PathBuf>,

    /// Maximum jobs running at once
    pub max_concurrent_jobs: usize,
}

impl InstallConfig {
    /// Defaults for everything but the destination
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            temp_dir: std::env::temp_dir(),
            limits: FetchLimits::default(),
            mirrors: MirrorPolicy::default(),
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
            min_multipart_parts: DEFAULT_MIN_MULTIPART_PARTS,
            sevenzip_path: None,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.destination.is_dir() {
            return Err(ConfigError::DestinationNotFound(self.destination.clone()));
        }

        if !self.temp_dir.is_dir() {
            return Err(ConfigError::TempDirNotFound(self.temp_dir.clone()));
        }

        let ratio = self.limits.min_complete_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidRatio(ratio));
        }

        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Game folder not found: {0}")]
    DestinationNotFound(PathBuf),

    #[error("Temp directory not found: {0}")]
    TempDirNotFound(PathBuf),

    #[error("Completeness ratio must be in (0, 1], got {0}")]
    InvalidRatio(f64),

    #[error("At least one concurrent job is required")]
    NoWorkers,
}
