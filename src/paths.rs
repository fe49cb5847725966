//! Case-insensitive path lookup
//!
//! Game folders copied from Windows keep their original casing, but on a
//! case-sensitive filesystem `Game/Bin/TS4_x64.exe` may exist as
//! `game/bin/ts4_x64.exe`. Lookups of known relative paths go through here.

use std::path::{Path, PathBuf};

/// Find a path case-insensitively within a directory
///
/// Given a base directory and a relative path like `Game/Bin/TS4_x64.exe`
/// (either separator), finds the actual entry even if it is `game\BIN\ts4_x64.EXE`.
pub fn resolve_case_insensitive(base: &Path, relative: &str) -> Option<PathBuf> {
    let components: Vec<&str> = relative
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .collect();

    let mut current = base.to_path_buf();

    for component in components {
        // Exact match first, avoids listing large directories
        let exact = current.join(component);
        if exact.exists() {
            current = exact;
            continue;
        }

        let target_lower = component.to_lowercase();
        let found = std::fs::read_dir(&current).ok()?.find_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name();
            if name.to_string_lossy().to_lowercase() == target_lower {
                Some(entry.path())
            } else {
                None
            }
        })?;
        current = found;
    }

    Some(current)
}
