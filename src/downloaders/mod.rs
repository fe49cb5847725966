//! Package download
//!
//! One URL in, one file out. A primary GitHub link is expanded into an ordered
//! list of proxy mirrors; every candidate is tried in turn until one produces a
//! complete file. Completeness is judged against the declared `Content-Length`
//! only (no checksums are available for packages).

mod http;
mod mirrors;

pub use http::{check_completeness, Fetcher, HttpClient};
pub use mirrors::MirrorPolicy;

use std::path::PathBuf;
use std::time::Duration;

/// Hard ceiling on accepted download size (10 GiB)
pub const MAX_DOWNLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Write buffer size for streamed bodies
pub const CHUNK_SIZE: usize = 256 * 1024;

/// A download shorter than this fraction of its declared length is truncated
pub const DEFAULT_MIN_COMPLETE_RATIO: f64 = 0.90;

/// Size/time limits applied to every download
#[derive(Debug, Clone)]
pub struct FetchLimits {
    /// Fraction of the declared length that must arrive
    pub min_complete_ratio: f64,
    /// Declared or streamed size above this is rejected
    pub max_size: u64,
    /// Buffered write size
    pub chunk_size: usize,
    /// Time to establish the connection
    pub connect_timeout: Duration,
    /// Maximum silence between body chunks
    pub read_timeout: Duration,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            min_complete_ratio: DEFAULT_MIN_COMPLETE_RATIO,
            max_size: MAX_DOWNLOAD_SIZE,
            chunk_size: CHUNK_SIZE,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// What to download
#[derive(Debug, Clone)]
pub enum FetchSource {
    /// A primary URL; mirrors are synthesized according to the [`MirrorPolicy`]
    Primary(String),
    /// An explicit ordered candidate list, used as-is
    Candidates(Vec<String>),
}

/// Download failures
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("No download source")]
    NoSource,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Download interrupted: {0}")]
    Interrupted(String),

    #[error("File too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("File incomplete ({written}/{declared})")]
    Incomplete { written: u64, declared: u64 },

    #[error("Empty file downloaded")]
    Empty,

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("All sources failed ({attempts} tried, last error: {last})")]
    AllSourcesFailed { attempts: usize, last: String },
}

impl FetchError {
    /// Errors that no other mirror can fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::TooLarge { .. } | FetchError::Io { .. })
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Connection(e.to_string())
        }
    }
}

/// Truncate URL for log lines
pub(crate) fn truncate_url(url: &str) -> String {
    if url.chars().count() > 80 {
        format!("{}...", url.chars().take(77).collect::<String>())
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FetchError::TooLarge { size: 1, max: 0 }.is_fatal());
        assert!(!FetchError::Status(404).is_fatal());
        assert!(!FetchError::Incomplete { written: 1, declared: 2 }.is_fatal());
    }

    #[test]
    fn test_truncate_url() {
        assert_eq!(truncate_url("https://a/b"), "https://a/b");
        let long = format!("https://example.com/{}", "x".repeat(100));
        let short = truncate_url(&long);
        assert_eq!(short.chars().count(), 80);
        assert!(short.ends_with("..."));
    }
}
