//! Job-owned temp files.
//!
//! Every file a job stages in the temp directory is wrapped in a guard that
//! removes it on drop, so success, failure, cancellation and task abort all
//! release it. Names carry a fixed prefix so a sweep can find leftovers from
//! crashed runs without touching anything else in a shared temp directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Prefix of every temp file this tool creates
pub const TEMP_PREFIX: &str = "_packdrop_";

/// Partial-download suffixes left behind by browsers and other tools
const STRAY_SUFFIXES: &[&str] = &[".part", ".crdownload", ".tmp"];

/// Remove a file, logging instead of failing. A missing file is fine.
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed temp file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn unique_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One staged download, removed when dropped
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    /// `_packdrop_<ID>_<token>.zip` in `temp_dir`
    pub fn for_package(temp_dir: &Path, package_id: &str) -> Self {
        let name = format!("{}{}_{}.zip", TEMP_PREFIX, package_id, unique_token());
        Self {
            path: temp_dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// Numbered volumes of one multi-part download, all removed when dropped.
///
/// Volumes share a stem so 7z finds `.002`, `.003`, ... next to `.001`.
#[derive(Debug)]
pub struct TempPartSet {
    parts: Vec<PathBuf>,
}

impl TempPartSet {
    pub fn for_package(temp_dir: &Path, package_id: &str, count: usize) -> Self {
        let stem = format!("{}{}_{}.7z", TEMP_PREFIX, package_id, unique_token());
        let parts = (1..=count)
            .map(|n| temp_dir.join(format!("{}.{:03}", stem, n)))
            .collect();
        Self { parts }
    }

    /// The volume handed to the extraction tool
    pub fn first(&self) -> Option<&Path> {
        self.parts.first().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.parts.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Drop for TempPartSet {
    fn drop(&mut self) {
        for part in &self.parts {
            remove_quietly(part);
        }
    }
}

fn file_name_lower(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_lowercase())
}

fn is_own_temp(path: &Path) -> bool {
    file_name_lower(path).is_some_and(|name| name.starts_with(TEMP_PREFIX))
}

/// Temp files of ours, or partial downloads of anyone's
pub fn is_stray_download(path: &Path) -> bool {
    file_name_lower(path).is_some_and(|name| {
        name.starts_with(TEMP_PREFIX) || STRAY_SUFFIXES.iter().any(|s| name.ends_with(s))
    })
}

/// Remove our leftover temp files directly inside `dir`.
///
/// Only files named with [`TEMP_PREFIX`] are touched. Returns what was removed.
pub fn sweep_temp_dir(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read temp directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut removed = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) || !is_own_temp(&path) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

/// Remove stray downloads anywhere under the game folder. Returns what was removed.
pub fn sweep_game_dir(dir: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_stray_download(path) {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed.push(path.to_path_buf()),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}

/// Count our temp files in `dir` (for leak checks)
pub fn count_temp_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| is_own_temp(&e.path()))
                .count()
        })
        .unwrap_or(0)
}
