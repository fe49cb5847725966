//! Streaming HTTP download with size validation and mirror fallback

use super::{truncate_url, FetchError, FetchLimits, FetchSource, MirrorPolicy};

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Content types a package host is expected to serve
const EXPECTED_CONTENT_TYPES: [&str; 4] = [
    "application/zip",
    "application/octet-stream",
    "application/x-zip-compressed",
    "application/x-7z-compressed",
];

/// Shared HTTP client
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(limits: &FetchLimits) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("packdrop/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(limits.connect_timeout)
            .read_timeout(limits.read_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Decide whether `written` bytes count as a complete download.
///
/// Zero bytes is always a failure. With a declared length, anything below
/// `min_ratio` of it is treated as a truncated transfer.
pub fn check_completeness(written: u64, declared: Option<u64>, min_ratio: f64) -> Result<(), FetchError> {
    if written == 0 {
        return Err(FetchError::Empty);
    }
    if let Some(declared) = declared.filter(|&d| d > 0) {
        if (written as f64) < (declared as f64) * min_ratio {
            return Err(FetchError::Incomplete { written, declared });
        }
    }
    Ok(())
}

/// Downloads one resource to one file, walking the candidate list
pub struct Fetcher {
    client: HttpClient,
    limits: FetchLimits,
    mirrors: MirrorPolicy,
}

impl Fetcher {
    pub fn new(limits: FetchLimits, mirrors: MirrorPolicy) -> Result<Self> {
        let client = HttpClient::new(&limits)?;
        Ok(Self {
            client,
            limits,
            mirrors,
        })
    }

    /// Download `source` to `dest`, returning the number of bytes written.
    ///
    /// On failure a partial file may be left at `dest`; the caller owns its removal.
    pub async fn download(&self, source: &FetchSource, dest: &Path) -> Result<u64, FetchError> {
        let candidates = match source {
            FetchSource::Primary(url) => self.mirrors.candidates(url),
            FetchSource::Candidates(urls) => urls.clone(),
        };
        if candidates.is_empty() {
            return Err(FetchError::NoSource);
        }

        let total = candidates.len();
        let mut last_error = None;

        for (i, url) in candidates.iter().enumerate() {
            if total > 1 {
                info!("Trying source {}/{}: {}", i + 1, total, truncate_url(url));
            }

            match self.download_one(url, dest).await {
                Ok(bytes) => {
                    debug!("Downloaded {} bytes from {}", bytes, truncate_url(url));
                    return Ok(bytes);
                }
                Err(e) if e.is_fatal() => {
                    warn!("Download aborted: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Source failed ({}): {}", truncate_url(url), e);
                    last_error = Some(e);
                }
            }
        }

        Err(FetchError::AllSourcesFailed {
            attempts: total,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Single attempt against one URL
    async fn download_one(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .inner()
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let declared = response.content_length().filter(|&len| len > 0);
        if let Some(len) = declared {
            if len > self.limits.max_size {
                return Err(FetchError::TooLarge {
                    size: len,
                    max: self.limits.max_size,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !EXPECTED_CONTENT_TYPES.iter().any(|ct| content_type.contains(ct)) {
            warn!("Unexpected content type: {:?}", content_type);
        }

        let io_err = |source: std::io::Error| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = File::create(dest).await.map_err(io_err)?;
        let mut writer = BufWriter::with_capacity(self.limits.chunk_size, file);

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Interrupted(e.to_string())
                }
            })?;

            written += chunk.len() as u64;
            if written > self.limits.max_size {
                return Err(FetchError::TooLarge {
                    size: written,
                    max: self.limits.max_size,
                });
            }
            writer.write_all(&chunk).await.map_err(io_err)?;
        }
        writer.flush().await.map_err(io_err)?;

        check_completeness(written, declared, self.limits.min_complete_ratio)?;
        Ok(written)
    }
}
