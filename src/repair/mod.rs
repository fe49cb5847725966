//! Game folder repair scan
//!
//! Runs every check in order and collects findings instead of stopping at the
//! first problem. Only two kinds of change are ever made to the game folder:
//! package folders with no content are removed, and stray download files
//! matching this tool's patterns are deleted. Everything else is reported.

pub mod validate;

pub use validate::{classify_package_folder, PackageHealth};

use crate::game_finder::{find_executable, package_folders, structure_issues};
use crate::installer::temp::{sweep_game_dir, sweep_temp_dir};

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MIB: u64 = 1024 * 1024;

/// Executables below this are probably truncated
pub const MIN_EXECUTABLE_SIZE: u64 = 30 * MIB;

/// Executables above this are suspicious
pub const MAX_EXECUTABLE_SIZE: u64 = 200 * MIB;

const PERMISSION_PROBE: &str = ".packdrop_permission_test";

/// Scan-level failures. Individual check failures go into the report instead.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("Game folder doesn't exist: {0}")]
    FolderMissing(PathBuf),

    #[error("Cannot read game folder {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What the scanner is allowed to touch
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directory swept for leftover `_packdrop_*` files
    pub temp_dir: PathBuf,
    /// Also remove partial downloads inside the game folder
    pub sweep_game_folder: bool,
    /// Remove package folders with no content
    pub prune_empty: bool,
}

impl ScanOptions {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            sweep_game_folder: true,
            prune_empty: true,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

/// Findings of one scan
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub game_path: PathBuf,
    pub generated_at: DateTime<Local>,
    pub checks: Vec<String>,
    /// Changes actually made; empty when nothing needed fixing
    pub fixes: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RepairReport {
    fn new(game_path: &Path) -> Self {
        Self {
            game_path: game_path.to_path_buf(),
            generated_at: Local::now(),
            checks: Vec::new(),
            fixes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// No critical errors
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }

    /// Multi-section text report
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== packdrop repair report ===");
        let _ = writeln!(out, "Time: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Game path: {}", self.game_path.display());

        let sections: [(&str, &str, &Vec<String>); 4] = [
            ("Checks performed", "-", &self.checks),
            ("Issues fixed", "+", &self.fixes),
            ("Warnings", "!", &self.warnings),
            ("Critical errors", "x", &self.errors),
        ];
        for (title, bullet, lines) in sections {
            if lines.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{}:", title);
            for line in lines {
                let _ = writeln!(out, "  {} {}", bullet, line);
            }
        }

        if self.is_healthy() {
            let _ = writeln!(out, "\nNo critical errors found");
        }
        out
    }
}

fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Scans one game folder
#[derive(Debug, Clone, Default)]
pub struct RepairScanner {
    options: ScanOptions,
}

impl RepairScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn scan(&self, folder: &Path) -> Result<RepairReport, RepairError> {
        if !folder.is_dir() {
            return Err(RepairError::FolderMissing(folder.to_path_buf()));
        }
        fs::read_dir(folder).map_err(|source| RepairError::Unreadable {
            path: folder.to_path_buf(),
            source,
        })?;

        info!("Scanning {}", folder.display());
        let mut report = RepairReport::new(folder);

        self.check_structure(folder, &mut report);
        self.check_executable(folder, &mut report);
        self.audit_packages(folder, &mut report);
        self.sweep_temp(folder, &mut report);
        self.check_permissions(folder, &mut report);

        info!(
            "Scan finished: {} fixes, {} warnings, {} errors",
            report.fixes.len(),
            report.warnings.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn check_structure(&self, folder: &Path, report: &mut RepairReport) {
        report.checks.push("Checked game structure".to_string());
        report.errors.extend(structure_issues(folder));
    }

    fn check_executable(&self, folder: &Path, report: &mut RepairReport) {
        let Some(exe) = find_executable(folder) else {
            report.errors.push("TS4_x64.exe missing".to_string());
            return;
        };

        let size = match fs::metadata(&exe) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Cannot stat {}: {}", exe.display(), e);
                report.checks.push("TS4_x64.exe: unable to get size".to_string());
                return;
            }
        };

        let size_mb = size as f64 / MIB as f64;
        report.checks.push(format!("TS4_x64.exe: {:.1} MB", size_mb));
        if size < MIN_EXECUTABLE_SIZE {
            report
                .warnings
                .push(format!("TS4_x64.exe small ({:.1} MB), may be corrupt", size_mb));
        } else if size > MAX_EXECUTABLE_SIZE {
            report.warnings.push(format!("TS4_x64.exe large ({:.1} MB)", size_mb));
        } else {
            report.checks.push("Game executable OK".to_string());
        }
    }

    fn audit_packages(&self, folder: &Path, report: &mut RepairReport) {
        let folders = package_folders(folder);
        let mut valid = 0usize;
        let mut total_size = 0u64;

        for (code, path) in &folders {
            let name = folder_name(path);
            match classify_package_folder(path) {
                PackageHealth::Valid { markers, size } => {
                    valid += 1;
                    total_size += size;
                    debug!("[{}] OK ({})", code, markers.join(", "));
                }
                PackageHealth::Empty if self.options.prune_empty => {
                    match fs::remove_dir_all(path) {
                        Ok(()) => {
                            info!("[{}] Removed empty folder", code);
                            report.fixes.push(format!("Removed empty package folder {}", name));
                        }
                        Err(e) => {
                            warn!("[{}] Failed to remove empty folder: {}", code, e);
                            report
                                .warnings
                                .push(format!("{}: empty folder could not be removed", name));
                        }
                    }
                }
                PackageHealth::Empty => {
                    report.warnings.push(format!("{}: Empty folder", name));
                }
                PackageHealth::NonStandard { file_count } => {
                    report
                        .warnings
                        .push(format!("{}: Non-standard content ({} files)", name, file_count));
                }
            }
        }

        report.checks.push(format!(
            "Found {}/{} valid packages ({:.1} GB total)",
            valid,
            folders.len(),
            total_size as f64 / (1024.0 * MIB as f64)
        ));
    }

    fn sweep_temp(&self, folder: &Path, report: &mut RepairReport) {
        report.checks.push("Cleaned temp files".to_string());

        let removed = sweep_temp_dir(&self.options.temp_dir);
        if !removed.is_empty() {
            report.fixes.push(format!(
                "Removed {} leftover temp file(s) from {}",
                removed.len(),
                self.options.temp_dir.display()
            ));
        }

        if self.options.sweep_game_folder {
            let removed = sweep_game_dir(folder);
            if !removed.is_empty() {
                report.fixes.push(format!(
                    "Removed {} partial download(s) from the game folder",
                    removed.len()
                ));
            }
        }
    }

    fn check_permissions(&self, folder: &Path, report: &mut RepairReport) {
        report.checks.push("Checked write permissions".to_string());

        let probe = folder.join(PERMISSION_PROBE);
        let writable = fs::write(&probe, b"").and_then(|()| fs::remove_file(&probe));
        if let Err(e) = writable {
            debug!("Permission probe failed: {}", e);
            report.warnings.push("Insufficient write permissions".to_string());
        }
    }
}
