//! Archive extraction into the game folder

use super::ExtractError;

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Wall-clock limit for one 7z run. Large packages are CPU/disk bound.
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);

fn open_zip(archive_path: &Path) -> Result<zip::ZipArchive<BufReader<File>>, ExtractError> {
    if !archive_path.is_file() {
        return Err(ExtractError::MissingArchive(archive_path.to_path_buf()));
    }
    let file = File::open(archive_path).map_err(|source| ExtractError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| ExtractError::InvalidZip(e.to_string()))
}

/// Read every entry once, discarding the data.
///
/// The zip reader checks each entry's CRC when it reaches the end, so a
/// damaged archive fails here before anything is written. Entry names are
/// checked here too: absolute paths and `..` components are refused.
fn verify_zip(archive: &mut zip::ZipArchive<BufReader<File>>) -> Result<(), ExtractError> {
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::InvalidZip(e.to_string()))?;
        if entry.enclosed_name().is_none() {
            return Err(ExtractError::UnsafePath(entry.name().to_string()));
        }
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink()).map_err(|e| ExtractError::CorruptEntry {
            name,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Extract a ZIP into `dest`, preserving relative paths.
///
/// Returns the number of files written. The whole archive is verified first,
/// so a corrupt archive or one with unsafe entry names leaves `dest` untouched.
pub fn extract_simple(archive_path: &Path, dest: &Path) -> Result<usize, ExtractError> {
    let mut archive = open_zip(archive_path)?;
    verify_zip(&mut archive)?;

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| ExtractError::Io { path, source }
    };

    fs::create_dir_all(dest).map_err(io_err(dest))?;

    let mut files = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::InvalidZip(e.to_string()))?;

        // Already checked by verify_zip
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::UnsafePath(entry.name().to_string()));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut output = File::create(&out_path).map_err(io_err(&out_path))?;
        io::copy(&mut entry, &mut output).map_err(io_err(&out_path))?;
        files += 1;
    }

    debug!("Extracted {} files from {}", files, archive_path.display());
    Ok(files)
}

/// Run `<tool> x <first_part> -o<dest> -y` and wait for it, at most `timeout`.
///
/// The remaining volumes must sit next to `first_part` with consecutive
/// `.00N` suffixes. On timeout the child is killed.
pub async fn extract_multipart(
    tool: &Path,
    first_part: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), ExtractError> {
    if !first_part.is_file() {
        return Err(ExtractError::MissingArchive(first_part.to_path_buf()));
    }
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|source| ExtractError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

    info!("Extracting {} with {}", first_part.display(), tool.display());

    let mut cmd = Command::new(tool);
    cmd.arg("x")
        .arg(first_part)
        .arg(format!("-o{}", dest.display()))
        .arg("-y")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => return Err(ExtractError::Timeout(timeout)),
        Ok(result) => result.map_err(|e| ExtractError::Spawn(e.to_string()))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        };
        return Err(ExtractError::Tool(reason));
    }

    Ok(())
}
