//! Archive handling.
//!
//! Single-file packages are plain ZIPs and are extracted natively with the
//! `zip` crate. Multi-part packages are split 7z volumes (`.7z.001`, ...) and
//! are handed to the external 7z binary, which finds the later volumes on its
//! own from the first part's name.

pub mod locator;
pub mod unpack;

pub use locator::ArchiveLocator;
pub use unpack::{extract_multipart, extract_simple, DEFAULT_EXTRACT_TIMEOUT};

use std::path::PathBuf;
use std::time::Duration;

/// Extraction failures
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Archive not found: {0}")]
    MissingArchive(PathBuf),

    #[error("Invalid zip archive: {0}")]
    InvalidZip(String),

    #[error("Corrupt entry '{name}': {reason}")]
    CorruptEntry { name: String, reason: String },

    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start 7z: {0}")]
    Spawn(String),

    #[error("7z extraction failed: {0}")]
    Tool(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}
