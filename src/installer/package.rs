//! Install one package: download, then extract into the game folder.
//!
//! Stages run strictly in order and the cancel flag is checked before each
//! one. Staged downloads live in temp guards owned by the current call, so
//! they are released on every exit path including task abort.

use super::config::InstallConfig;
use super::job::{CancelFlag, JobState};
use super::temp::{TempArtifact, TempPartSet};
use crate::archive::{extract_multipart, extract_simple, ArchiveLocator, ExtractError};
use crate::catalog::{PackageDescriptor, PackageSource};
use crate::downloaders::{FetchError, FetchSource, Fetcher};

use anyhow::Result;
use tracing::{debug, info};

/// Why a package failed to install
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("No download source for {0}")]
    MissingSource(String),

    #[error("Incomplete part set: {found} part(s) listed, at least {required} required")]
    IncompletePartSet { found: usize, required: usize },

    #[error("7z not found (required for multi-part packages)")]
    ToolNotFound,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Part {part}/{total}: {source}")]
    PartFetch {
        part: usize,
        total: usize,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Callback receiving stage transitions
pub type StateCallback<'a> = &'a (dyn Fn(JobState) + Send + Sync);

/// Downloads and extracts packages into the configured game folder
pub struct PackageInstaller {
    config: InstallConfig,
    fetcher: Fetcher,
    locator: ArchiveLocator,
}

impl PackageInstaller {
    pub fn new(config: InstallConfig) -> Result<Self> {
        let fetcher = Fetcher::new(config.limits.clone(), config.mirrors.clone())?;
        let locator = ArchiveLocator::with_override(config.sevenzip_path.clone());
        Ok(Self {
            config,
            fetcher,
            locator,
        })
    }

    /// Replace the 7z search
    pub fn with_locator(mut self, locator: ArchiveLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    /// Run every stage for `package`. Binary outcome: any failure fails the package.
    pub async fn install(
        &self,
        package: &PackageDescriptor,
        cancel: &CancelFlag,
        on_state: StateCallback<'_>,
    ) -> Result<(), InstallError> {
        cancel.check()?;
        info!("[{}] Installing {}", package.id, package.display_name);

        match &package.source {
            PackageSource::SingleFile(url) if !url.trim().is_empty() => {
                self.install_single(&package.id, url, cancel, on_state).await
            }
            PackageSource::MultiPart(urls) if !urls.is_empty() => {
                self.install_multipart(&package.id, urls, cancel, on_state).await
            }
            _ => Err(InstallError::MissingSource(package.id.clone())),
        }
    }

    async fn install_single(
        &self,
        id: &str,
        url: &str,
        cancel: &CancelFlag,
        on_state: StateCallback<'_>,
    ) -> Result<(), InstallError> {
        on_state(JobState::Downloading);
        let artifact = TempArtifact::for_package(&self.config.temp_dir, id);
        let bytes = self
            .fetcher
            .download(&FetchSource::Primary(url.to_string()), artifact.path())
            .await?;
        info!("[{}] Downloaded {:.1} MB", id, bytes as f64 / 1_048_576.0);

        cancel.check()?;
        on_state(JobState::Extracting);

        let archive = artifact.path().to_path_buf();
        let dest = self.config.destination.clone();
        let files = tokio::task::spawn_blocking(move || extract_simple(&archive, &dest))
            .await
            .map_err(|e| InstallError::Internal(format!("Extraction task failed: {}", e)))??;

        info!("[{}] Installed ({} files)", id, files);
        Ok(())
    }

    async fn install_multipart(
        &self,
        id: &str,
        urls: &[String],
        cancel: &CancelFlag,
        on_state: StateCallback<'_>,
    ) -> Result<(), InstallError> {
        let required = self.config.min_multipart_parts;
        if urls.len() < required {
            return Err(InstallError::IncompletePartSet {
                found: urls.len(),
                required,
            });
        }

        let tool = self.locator.locate().ok_or(InstallError::ToolNotFound)?;
        debug!("[{}] Using 7z at {}", id, tool.display());

        on_state(JobState::Downloading);
        let parts = TempPartSet::for_package(&self.config.temp_dir, id, urls.len());
        let total = urls.len();

        for (i, (url, path)) in urls.iter().zip(parts.iter()).enumerate() {
            cancel.check()?;
            info!("[{}] Downloading part {}/{}", id, i + 1, total);
            self.fetcher
                .download(&FetchSource::Primary(url.clone()), path)
                .await
                .map_err(|source| InstallError::PartFetch {
                    part: i + 1,
                    total,
                    source,
                })?;
        }

        cancel.check()?;
        on_state(JobState::Extracting);

        let first = parts
            .first()
            .ok_or_else(|| InstallError::MissingSource(id.to_string()))?;
        extract_multipart(&tool, first, &self.config.destination, self.config.extract_timeout)
            .await?;

        info!("[{}] Installed ({} parts)", id, total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloaders::MirrorPolicy;
    use crate::installer::temp::count_temp_files;
    use crate::test_support::{zip_bytes, Reply, TestServer};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        temp: TempDir,
        game: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp: tempdir().unwrap(),
                game: tempdir().unwrap(),
            }
        }

        fn config(&self) -> InstallConfig {
            InstallConfig {
                temp_dir: self.temp.path().to_path_buf(),
                mirrors: MirrorPolicy::direct_only(),
                ..InstallConfig::new(self.game.path())
            }
        }

        fn installer(&self, tool: Option<PathBuf>) -> PackageInstaller {
            let locator = ArchiveLocator::custom(None, tool.into_iter().collect());
            PackageInstaller::new(self.config())
                .unwrap()
                .with_locator(locator)
        }
    }

    fn single(id: &str, url: String) -> PackageDescriptor {
        PackageDescriptor {
            id: id.to_string(),
            display_name: format!("{} test", id),
            source: PackageSource::SingleFile(url),
        }
    }

    fn multi(id: &str, urls: Vec<String>) -> PackageDescriptor {
        PackageDescriptor {
            id: id.to_string(),
            display_name: format!("{} test", id),
            source: PackageSource::MultiPart(urls),
        }
    }

    fn placeholder_tool(dir: &Path) -> PathBuf {
        let tool = dir.join("7z");
        std::fs::write(&tool, b"").unwrap();
        tool
    }

    #[tokio::test]
    async fn test_single_file_round_trip() {
        let fx = Fixture::new();
        let archive = zip_bytes(&[
            ("EP01/", b""),
            ("EP01/ClientFullBuild0.package", b"full"),
            ("EP01/_locdata_/strings_ENG_US.package", b"strings"),
        ]);
        let server = TestServer::start(vec![("/EP01.zip", Reply::ok(archive))]).await;

        let states = Mutex::new(Vec::new());
        let record = |s: JobState| states.lock().unwrap().push(s);
        fx.installer(None)
            .install(&single("EP01", server.url("/EP01.zip")), &CancelFlag::new(), &record)
            .await
            .unwrap();

        assert!(fx.game.path().join("EP01/ClientFullBuild0.package").is_file());
        assert!(fx.game.path().join("EP01/_locdata_/strings_ENG_US.package").is_file());
        assert_eq!(count_temp_files(fx.temp.path()), 0);
        assert_eq!(
            *states.lock().unwrap(),
            vec![JobState::Downloading, JobState::Extracting]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_cleans_up() {
        let fx = Fixture::new();
        let server = TestServer::start(vec![(
            "/GP01.zip",
            Reply::Truncated {
                declared: 4096,
                body: vec![0u8; 100],
            },
        )])
        .await;

        let err = fx
            .installer(None)
            .install(&single("GP01", server.url("/GP01.zip")), &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Fetch(FetchError::AllSourcesFailed { .. })));
        assert_eq!(count_temp_files(fx.temp.path()), 0);
        assert_eq!(std::fs::read_dir(fx.game.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_archive_cleans_up() {
        let fx = Fixture::new();
        let server =
            TestServer::start(vec![("/SP01.zip", Reply::ok(b"not a zip at all".to_vec()))]).await;

        let err = fx
            .installer(None)
            .install(&single("SP01", server.url("/SP01.zip")), &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Extract(ExtractError::InvalidZip(_))));
        assert_eq!(count_temp_files(fx.temp.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let fx = Fixture::new();
        let err = fx
            .installer(None)
            .install(&single("FP01", String::new()), &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::MissingSource(id) if id == "FP01"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new();
        let server = TestServer::start(vec![("/EP02.zip", Reply::ok(vec![1]))]).await;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = fx
            .installer(None)
            .install(&single("EP02", server.url("/EP02.zip")), &cancel, &|_: JobState| {})
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Cancelled));
        assert!(server.hits().is_empty());
    }

    #[tokio::test]
    async fn test_multipart_failed_part_skips_extraction() {
        let fx = Fixture::new();
        let tools = tempdir().unwrap();
        // A non-executable placeholder: reaching extraction would fail with a spawn error
        let tool = placeholder_tool(tools.path());
        let server = TestServer::start(vec![
            ("/SP10.7z.001", Reply::ok(vec![1u8; 2048])),
            ("/SP10.7z.002", Reply::status(404)),
            ("/SP10.7z.003", Reply::ok(vec![3u8; 2048])),
        ])
        .await;
        let package = multi(
            "SP10",
            vec![
                server.url("/SP10.7z.001"),
                server.url("/SP10.7z.002"),
                server.url("/SP10.7z.003"),
            ],
        );

        let err = fx
            .installer(Some(tool))
            .install(&package, &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::PartFetch { part: 2, total: 3, .. }));
        assert_eq!(
            server.hits(),
            vec!["/SP10.7z.001".to_string(), "/SP10.7z.002".to_string()]
        );
        assert_eq!(count_temp_files(fx.temp.path()), 0);
    }

    #[tokio::test]
    async fn test_multipart_requires_tool_before_downloading() {
        let fx = Fixture::new();
        let server = TestServer::start(vec![]).await;
        let package = multi("SP11", vec![server.url("/a.001"), server.url("/a.002")]);

        let err = fx
            .installer(None)
            .install(&package, &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ToolNotFound));
        assert!(server.hits().is_empty());
    }

    #[tokio::test]
    async fn test_single_part_set_is_incomplete() {
        let fx = Fixture::new();
        let tools = tempdir().unwrap();
        let package = multi("SP12", vec!["https://example.invalid/a.001".to_string()]);

        let err = fx
            .installer(Some(placeholder_tool(tools.path())))
            .install(&package, &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::IncompletePartSet { found: 1, required: 2 }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_multipart_success_removes_parts() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let tools = tempdir().unwrap();
        let tool = tools.path().join("7z");
        // Concatenates every volume next to the first one into <dest>/SP20/joined.bin
        std::fs::write(
            &tool,
            "#!/bin/sh\nfirst=\"$2\"\ndest=\"${3#-o}\"\nmkdir -p \"$dest/SP20\"\ncat \"${first%.001}\".0* > \"$dest/SP20/joined.bin\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let server = TestServer::start(vec![
            ("/SP20.7z.001", Reply::ok(b"aaa".to_vec())),
            ("/SP20.7z.002", Reply::ok(b"bbb".to_vec())),
        ])
        .await;
        let package = multi(
            "SP20",
            vec![server.url("/SP20.7z.001"), server.url("/SP20.7z.002")],
        );

        let installer = fx.installer(Some(tool));
        installer
            .install(&package, &CancelFlag::new(), &|_: JobState| {})
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(fx.game.path().join("SP20/joined.bin")).unwrap(),
            b"aaabbb"
        );
        assert_eq!(count_temp_files(fx.temp.path()), 0);
    }
}
