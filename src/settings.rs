//! Persisted user settings
//!
//! Stored in `<config_dir>/packdrop/settings.json`. A missing or unreadable
//! file is never fatal; defaults are used instead.

use crate::downloaders::FetchLimits;
use crate::installer::config::{DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_MIN_MULTIPART_PARTS};
use crate::installer::InstallConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote catalog document
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/packdrop/addon-packs/main/catalog.json";

/// User settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last used game folder
    pub game_path: Option<PathBuf>,

    /// Refresh the catalog from `catalog_url` when online
    pub use_remote_catalog: bool,

    pub catalog_url: String,

    /// Age below which the cached remote catalog is reused
    pub catalog_cache_secs: u64,

    pub max_concurrent_jobs: usize,

    /// Fraction of the declared length a download must reach
    pub min_complete_ratio: f64,

    /// Multi-part sources listing fewer parts are rejected
    pub min_multipart_parts: usize,

    /// Installs refuse to start below this much free space (unless forced)
    pub min_free_space_gb: u64,

    /// 7z binary to use instead of searching
    pub sevenzip_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_path: None,
            use_remote_catalog: true,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            catalog_cache_secs: 3600,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            min_complete_ratio: FetchLimits::default().min_complete_ratio,
            min_multipart_parts: DEFAULT_MIN_MULTIPART_PARTS,
            min_free_space_gb: 15,
            sevenzip_path: None,
        }
    }
}

impl Settings {
    /// Get the config directory path (~/.config/packdrop)
    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("packdrop");

        Ok(config_dir)
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.json"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load settings: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;

        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    pub fn catalog_max_age(&self) -> Duration {
        Duration::from_secs(self.catalog_cache_secs)
    }

    /// Runtime install configuration for `destination`
    pub fn install_config(&self, destination: &Path) -> InstallConfig {
        let mut config = InstallConfig::new(destination);
        config.limits.min_complete_ratio = self.min_complete_ratio;
        config.min_multipart_parts = self.min_multipart_parts;
        config.max_concurrent_jobs = self.max_concurrent_jobs;
        config.sevenzip_path = self.sevenzip_path.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.game_path.is_none());
        assert!(settings.use_remote_catalog);
        assert_eq!(settings.catalog_cache_secs, 3600);
        assert_eq!(settings.max_concurrent_jobs, 2);
        assert_eq!(settings.min_multipart_parts, 2);
        assert_eq!(settings.min_free_space_gb, 15);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/settings.json");
        let settings = Settings {
            game_path: Some(PathBuf::from("/games/The Sims 4")),
            use_remote_catalog: false,
            max_concurrent_jobs: 4,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"game_path": "/games/ts4"}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.game_path, Some(PathBuf::from("/games/ts4")));
        assert_eq!(settings.catalog_url, DEFAULT_CATALOG_URL);
        assert!((settings.min_complete_ratio - 0.90).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_file_is_default_and_garbage_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_install_config_carries_thresholds() {
        let settings = Settings {
            min_complete_ratio: 0.75,
            min_multipart_parts: 3,
            max_concurrent_jobs: 5,
            ..Settings::default()
        };
        let config = settings.install_config(Path::new("/games/ts4"));
        assert_eq!(config.destination, PathBuf::from("/games/ts4"));
        assert!((config.limits.min_complete_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.min_multipart_parts, 3);
        assert_eq!(config.max_concurrent_jobs, 5);
    }
}
