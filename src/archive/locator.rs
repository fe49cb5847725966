//! Locates the 7z binary used for multi-part packages.
//!
//! Search order, first match wins:
//! 1. `7z`/`7zz`/`7za` (or the `.exe` variants) next to the running executable,
//!    also under a `bin/` subfolder
//! 2. Well-known installation paths for the platform
//! 3. The system `PATH`
//!
//! Not finding it is normal for users who never install multi-part packages,
//! so the result is an `Option`, checked only when a multi-part job starts.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(windows)]
const LOCAL_NAMES: &[&str] = &["7z.exe", "7za.exe", "bin/7z.exe"];
#[cfg(not(windows))]
const LOCAL_NAMES: &[&str] = &["7zz", "7z", "bin/7zz", "bin/7z"];

#[cfg(windows)]
const WELL_KNOWN: &[&str] = &[
    r"C:\Program Files\7-Zip\7z.exe",
    r"C:\Program Files\7-Zip\7za.exe",
    r"C:\Program Files (x86)\7-Zip\7z.exe",
    r"C:\Program Files (x86)\7-Zip\7za.exe",
];
#[cfg(not(windows))]
const WELL_KNOWN: &[&str] = &[
    "/usr/bin/7zz",
    "/usr/bin/7z",
    "/usr/lib/p7zip/7z",
    "/usr/local/bin/7zz",
    "/usr/local/bin/7z",
    "/opt/homebrew/bin/7zz",
];

/// Names looked up on `PATH`
const PATH_NAMES: &[&str] = &["7z", "7zz", "7za"];

/// Configurable search for the extraction tool
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    override_path: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
    well_known: Vec<PathBuf>,
    path_names: Vec<String>,
}

impl Default for ArchiveLocator {
    fn default() -> Self {
        Self {
            override_path: None,
            exe_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
            well_known: WELL_KNOWN.iter().map(PathBuf::from).collect(),
            path_names: PATH_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ArchiveLocator {
    /// System search with an optional user-configured path tried first
    pub fn with_override(override_path: Option<PathBuf>) -> Self {
        Self {
            override_path,
            ..Self::default()
        }
    }

    /// Search only the given locations (no PATH lookup)
    pub fn custom(exe_dir: Option<PathBuf>, well_known: Vec<PathBuf>) -> Self {
        Self {
            override_path: None,
            exe_dir,
            well_known,
            path_names: Vec::new(),
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.override_path.as_ref().filter(|p| p.is_file()) {
            debug!("Using configured 7z: {}", path.display());
            return Some(path.clone());
        }

        if let Some(dir) = &self.exe_dir {
            for name in LOCAL_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    info!("Using local 7z: {}", candidate.display());
                    return Some(candidate);
                }
            }
        }

        if let Some(found) = self.well_known.iter().find(|p| p.is_file()) {
            info!("Found 7z at: {}", found.display());
            return Some(found.clone());
        }

        for name in &self.path_names {
            if let Ok(found) = which::which(name) {
                info!("Found 7z via PATH: {}", found.display());
                return Some(found);
            }
        }

        debug!("7z not found");
        None
    }
}
