//! Package folder classification

use std::path::Path;
use walkdir::WalkDir;

/// Subfolders that only appear inside real packages
pub const PACKAGE_MARKER_FOLDERS: &[&str] = &[
    "_locdata_",
    "_installer",
    "Geometry",
    "Thumbnails",
    "UI",
    "Audio",
    "Movies",
];

/// File extensions of package content
pub const PACKAGE_MARKER_EXTENSIONS: &[&str] =
    &["package", "bnk", "trayitem", "sgi", "dll", "ts4script"];

/// What a package folder looks like on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageHealth {
    /// Has marker folders or marker files
    Valid { markers: Vec<String>, size: u64 },
    /// Nothing but (possibly nested) empty directories
    Empty,
    /// Has content, none of it recognisable
    NonStandard { file_count: usize },
}

impl PackageHealth {
    pub fn is_valid(&self) -> bool {
        matches!(self, PackageHealth::Valid { .. })
    }
}

fn marker_folders(folder: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };
    let present: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().to_lowercase())
        .collect();

    PACKAGE_MARKER_FOLDERS
        .iter()
        .filter(|m| present.contains(&m.to_lowercase()))
        .map(|m| m.to_string())
        .collect()
}

fn has_marker_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    PACKAGE_MARKER_EXTENSIONS.iter().copied().find(|m| *m == ext)
}

/// Classify one package folder.
///
/// Anything that is not a directory (files, links) counts as content, so
/// only folders holding nothing but empty directories come back `Empty`.
pub fn classify_package_folder(folder: &Path) -> PackageHealth {
    let mut markers = marker_folders(folder);
    let mut file_count = 0usize;
    let mut size = 0u64;

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
    {
        file_count += 1;
        size += entry.metadata().map(|m| m.len()).unwrap_or(0);

        if let Some(ext) = has_marker_extension(entry.path()) {
            let marker = format!(".{}", ext);
            if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
    }

    if file_count == 0 {
        PackageHealth::Empty
    } else if markers.is_empty() {
        PackageHealth::NonStandard { file_count }
    } else {
        PackageHealth::Valid { markers, size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_package_files_are_valid() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("GP05");
        fs::create_dir_all(pkg.join("sub")).unwrap();
        fs::write(pkg.join("sub/mod.TS4SCRIPT"), b"12345").unwrap();
        fs::write(pkg.join("ClientFullBuild0.package"), b"DBPF").unwrap();

        match classify_package_folder(&pkg) {
            PackageHealth::Valid { markers, size } => {
                assert_eq!(size, 9);
                assert!(markers.contains(&".ts4script".to_string()));
                assert!(markers.contains(&".package".to_string()));
            }
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_folder_with_content_is_valid() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("EP03");
        fs::create_dir_all(pkg.join("thumbnails")).unwrap();
        fs::write(pkg.join("thumbnails/blob.bin"), b"x").unwrap();

        assert_eq!(
            classify_package_folder(&pkg),
            PackageHealth::Valid {
                markers: vec!["Thumbnails".to_string()],
                size: 1
            }
        );
    }

    #[test]
    fn test_nested_empty_dirs_are_empty() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("GP02");
        fs::create_dir_all(pkg.join("_locdata_/deeper")).unwrap();
        assert_eq!(classify_package_folder(&pkg), PackageHealth::Empty);
    }

    #[test]
    fn test_unknown_content_is_non_standard() {
        let dir = tempdir().unwrap();
        let pkg = dir.path().join("SP05");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("README.txt"), b"hello").unwrap();
        fs::write(pkg.join("notes.md"), b"hello").unwrap();

        assert_eq!(
            classify_package_folder(&pkg),
            PackageHealth::NonStandard { file_count: 2 }
        );
    }
}
