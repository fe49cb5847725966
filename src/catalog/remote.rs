//! Remote catalog refresh with a time-based local cache.
//!
//! Any failure along the way falls back to the bundled table; the caller
//! always gets a usable catalog.

use super::Catalog;
use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Timeout for the catalog request
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fetches the catalog document and keeps a cached copy on disk
pub struct RemoteCatalog {
    client: Client,
    url: String,
    cache_file: Option<PathBuf>,
    max_age: Duration,
}

impl RemoteCatalog {
    pub fn new(url: impl Into<String>, cache_file: Option<PathBuf>, max_age: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("packdrop/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            cache_file,
            max_age,
        })
    }

    /// Default cache location (`<cache_dir>/packdrop/catalog.json`)
    pub fn default_cache_file() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("packdrop").join("catalog.json"))
    }

    /// Fresh cache, then network, then the bundled table.
    pub async fn load(&self, force_refresh: bool) -> Catalog {
        if !force_refresh {
            if let Some(catalog) = self.cache_file.as_deref().and_then(|p| self.read_cache(p)) {
                info!("Using cached catalog ({} packages)", catalog.len());
                return catalog;
            }
        }

        match self.fetch().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Remote catalog unavailable: {:#}. Using bundled catalog.", e);
                Catalog::bundled()
            }
        }
    }

    /// Download and parse the document, refreshing the cache on success
    pub async fn fetch(&self) -> Result<Catalog> {
        info!("Fetching catalog from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch catalog")?;

        if !response.status().is_success() {
            bail!("HTTP {}", response.status().as_u16());
        }

        let text = response.text().await.context("Failed to read catalog body")?;
        let catalog = Catalog::from_json(&text).context("Failed to parse catalog")?;

        if let Some(cache) = &self.cache_file {
            if let Err(e) = write_cache(cache, &text) {
                warn!("Could not write catalog cache: {:#}", e);
            }
        }

        info!("Catalog updated: {} packages", catalog.len());
        Ok(catalog)
    }

    /// Cached catalog if it exists, is young enough and parses
    fn read_cache(&self, path: &Path) -> Option<Catalog> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age >= self.max_age {
            debug!("Catalog cache is stale ({}s old)", age.as_secs());
            return None;
        }

        let text = std::fs::read_to_string(path).ok()?;
        match Catalog::from_json(&text) {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                warn!("Ignoring broken catalog cache {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn write_cache(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
