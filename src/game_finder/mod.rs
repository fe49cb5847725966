//! Game folder detection and layout
//!
//! Knows where the game usually lives, what a healthy install looks like,
//! and which top-level folders mark installed packages.

use crate::paths::resolve_case_insensitive;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main executable, relative to the game folder
pub const GAME_EXECUTABLE: &str = "Game/Bin/TS4_x64.exe";

/// Folders every install has
pub const REQUIRED_FOLDERS: &[&str] = &["Game", "Data", "Game/Bin"];

/// At least one of these must exist for the folder to be the game at all
pub const DATA_MARKERS: &[&str] = &[
    "Data/Client/ClientDeltaBuild0.package",
    "Data/Client/ClientFullBuild0.package",
    "Data/Simulation/FullBuild0.package",
];

/// Install folder name under the various store layouts
const INSTALL_DIR_NAME: &str = "The Sims 4";

static PACKAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(EP|GP|SP|FP)(\d+)").unwrap());

/// Package code at the start of a folder name, upper-cased (`ep01 Get to Work` -> `EP01`)
pub fn package_code(name: &str) -> Option<String> {
    PACKAGE_CODE
        .captures(name)
        .map(|caps| format!("{}{}", caps[1].to_uppercase(), &caps[2]))
}

/// Package folders present directly under `folder`: `(code, path)` pairs
pub fn package_folders(folder: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(folder) else {
        return Vec::new();
    };

    let mut found: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            package_code(&name).map(|code| (code, e.path()))
        })
        .collect();
    found.sort();
    found
}

/// Ids of installed packages. Missing or unreadable folder => empty set.
pub fn installed_ids(folder: &Path) -> BTreeSet<String> {
    package_folders(folder)
        .into_iter()
        .map(|(code, _)| code)
        .collect()
}

/// Executable path, matched case-insensitively
pub fn find_executable(folder: &Path) -> Option<PathBuf> {
    resolve_case_insensitive(folder, GAME_EXECUTABLE).filter(|p| p.is_file())
}

/// Missing required folders and data markers
pub fn structure_issues(folder: &Path) -> Vec<String> {
    let mut issues: Vec<String> = REQUIRED_FOLDERS
        .iter()
        .filter(|required| resolve_case_insensitive(folder, required).is_none())
        .map(|required| format!("Missing folder: {}", required))
        .collect();

    let markers = DATA_MARKERS
        .iter()
        .filter(|m| resolve_case_insensitive(folder, m).is_some())
        .count();
    if markers == 0 {
        issues.push("Doesn't appear to be a game folder".to_string());
    }

    issues
}

/// Problems that make `folder` unusable as a game install. Empty when healthy.
pub fn validate_game_folder(folder: &Path) -> Vec<String> {
    if !folder.is_dir() {
        return vec!["Game folder doesn't exist".to_string()];
    }

    let mut issues = Vec::new();
    if find_executable(folder).is_none() {
        issues.push("TS4_x64.exe missing - game cannot run".to_string());
    }
    issues.extend(structure_issues(folder));
    issues
}

/// Usual install locations, most likely first
pub fn candidate_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(windows) {
        let suffixes = [
            r"Program Files (x86)\Steam\steamapps\common",
            r"Program Files\Steam\steamapps\common",
            r"SteamLibrary\steamapps\common",
            r"Program Files\EA Games",
            r"Program Files (x86)\EA Games",
            r"Program Files (x86)\Origin Games",
            "",
        ];
        for drive in ['C', 'D', 'E', 'F', 'G', 'H'] {
            for suffix in suffixes {
                candidates.push(
                    PathBuf::from(format!(r"{}:\", drive))
                        .join(suffix)
                        .join(INSTALL_DIR_NAME),
                );
            }
        }
    } else if let Some(home) = home {
        // Steam library roots, as they appear on Linux and under Proton
        let steam_roots = [
            ".local/share/Steam",
            ".steam/debian-installation",
            ".steam/steam",
            ".var/app/com.valvesoftware.Steam/data/Steam",
            ".var/app/com.valvesoftware.Steam/.local/share/Steam",
            "snap/steam/common/.local/share/Steam",
        ];
        for root in steam_roots {
            candidates.push(home.join(root).join("steamapps/common").join(INSTALL_DIR_NAME));
        }
        candidates.push(home.join("Games").join(INSTALL_DIR_NAME));
    }

    candidates
}

/// First candidate folder that contains the game executable
pub fn detect_in(candidates: &[PathBuf]) -> Option<PathBuf> {
    for candidate in candidates {
        debug!("Checking {}", candidate.display());
        if candidate.is_dir() && find_executable(candidate).is_some() {
            info!("Found game: {}", candidate.display());
            return Some(candidate.clone());
        }
    }
    None
}

/// Detect the game folder on this machine
pub fn detect_game_path() -> Option<PathBuf> {
    let home = dirs::home_dir();
    detect_in(&candidate_paths(home.as_deref()))
}
