//! packdrop - add-on package installer and repair tool

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use packdrop::archive::ArchiveLocator;
use packdrop::catalog::{Catalog, PackageDescriptor, RemoteCatalog};
use packdrop::game_finder;
use packdrop::installer::{
    InstallStats, JobOutcome, JobRunner, JobStatus, PackageInstaller, RunnerEvent,
    DEFAULT_CANCEL_GRACE,
};
use packdrop::repair::ScanOptions;
use packdrop::settings::Settings;
use packdrop::system;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "packdrop")]
#[command(version)]
#[command(about = "Installs, updates and repairs add-on packages for The Sims 4")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Don't touch the network: bundled catalog only, installs disabled
    #[arg(long, global = true, env = "PACKDROP_OFFLINE")]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog packages by category
    List {
        /// Game folder (defaults to the configured one)
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Include packages that are already installed
        #[arg(long)]
        all: bool,
    },

    /// Download and install packages into the game folder
    Install {
        /// Package ids, e.g. EP01 GP04
        ids: Vec<String>,

        /// Game folder (defaults to the configured one)
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Install every catalog package that is not installed yet
        #[arg(long)]
        all_missing: bool,

        /// Maximum packages processed at once
        #[arg(short, long)]
        concurrent: Option<usize>,

        /// Proceed despite a missing executable or low disk space, reinstall installed packages
        #[arg(long)]
        force: bool,
    },

    /// Check the game folder and clean up empty package folders and stray temp files
    Repair {
        /// Game folder (defaults to the configured one)
        #[arg(short, long)]
        game: Option<PathBuf>,

        /// Also write the report to this file
        #[arg(long)]
        save_report: Option<PathBuf>,

        /// Print (and save) the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the game folder automatically and remember it
    Detect,

    /// Show connectivity, 7z, disk space and game folder health
    Status {
        /// Game folder (defaults to the configured one)
        #[arg(short, long)]
        game: Option<PathBuf>,
    },

    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,

    /// Remember the game folder
    SetGame {
        path: PathBuf,
    },

    /// Enable or disable the remote catalog
    SetRemoteCatalog {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

/// Stderr output when verbose (or RUST_LOG is set), plus a daily log file.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(verbose: bool) -> Result<Option<WorkerGuard>> {
    let directive: Directive = if verbose {
        "packdrop=info".parse()?
    } else {
        "packdrop=warn".parse()?
    };

    let stderr_layer = (verbose || std::env::var("RUST_LOG").is_ok()).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_default_env().add_directive(directive))
    });

    let appender = dirs::data_local_dir().and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("packdrop.log")
            .build(dir.join("packdrop").join("logs"))
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("packdrop=info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// `--game`, then the saved folder, then auto-detection
fn resolve_game(arg: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    if let Some(path) = arg.or_else(|| settings.game_path.clone()) {
        return Ok(path);
    }
    if let Some(path) = game_finder::detect_game_path() {
        println!("Detected game folder: {}", path.display());
        return Ok(path);
    }
    bail!("No game folder set. Use --game, `packdrop detect` or `packdrop config set-game <DIR>`")
}

async fn load_catalog(settings: &Settings, online: bool) -> Catalog {
    if !settings.use_remote_catalog || !online {
        return Catalog::bundled();
    }
    match RemoteCatalog::new(
        settings.catalog_url.as_str(),
        RemoteCatalog::default_cache_file(),
        settings.catalog_max_age(),
    ) {
        Ok(remote) => remote.load(false).await,
        Err(e) => {
            warn!("Remote catalog disabled: {:#}", e);
            Catalog::bundled()
        }
    }
}

async fn check_online(offline: bool) -> bool {
    if offline {
        return false;
    }
    let online = system::is_online().await;
    if !online {
        println!("No internet connection detected, working offline");
    }
    online
}

/// Drain runner events into a progress bar; returns outcomes in completion order
async fn run_with_progress(runner: &mut JobRunner) -> Vec<JobOutcome> {
    let pb = ProgressBar::new(runner.submitted() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut outcomes = Vec::new();
    while let Some(event) = runner.next_event().await {
        match event {
            RunnerEvent::State { label, state, .. } => {
                pb.set_message(format!("{}: {}", label, state));
            }
            RunnerEvent::Finished(outcome) => {
                pb.inc(1);
                match &outcome.status {
                    JobStatus::Succeeded => pb.println(format!("[OK]        {}", outcome.label)),
                    JobStatus::Failed(reason) => {
                        pb.println(format!("[FAILED]    {}: {}", outcome.label, reason))
                    }
                    JobStatus::Cancelled => pb.println(format!("[CANCELLED] {}", outcome.label)),
                }
                outcomes.push(outcome);
            }
        }
    }

    pb.finish_and_clear();
    outcomes
}

/// Cancel everything on Ctrl-C. Abort the returned handle once the run is over.
fn spawn_ctrl_c_handler(runner: &JobRunner) -> tokio::task::JoinHandle<()> {
    let canceller = runner.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, waiting up to {:?} for running jobs...", DEFAULT_CANCEL_GRACE);
            let aborted = canceller.cancel_all(DEFAULT_CANCEL_GRACE).await;
            if aborted > 0 {
                eprintln!("Force-stopped {} job(s)", aborted);
            }
        }
    })
}

fn select_packages(
    catalog: &Catalog,
    installed: &BTreeSet<String>,
    ids: &[String],
    all_missing: bool,
    force: bool,
) -> Result<Vec<PackageDescriptor>> {
    if all_missing {
        return Ok(catalog.available(installed).cloned().collect());
    }

    let mut selected: Vec<PackageDescriptor> = Vec::new();
    for id in ids {
        let Some(package) = catalog.get(id) else {
            bail!("Unknown package: {} (see `packdrop list --all`)", id);
        };
        if installed.contains(&package.id) && !force {
            println!("{} is already installed, skipping (use --force to reinstall)", package.id);
            continue;
        }
        if !selected.iter().any(|p| p.id == package.id) {
            selected.push(package.clone());
        }
    }
    Ok(selected)
}

fn preflight(game: &Path, settings: &Settings, force: bool) -> Result<()> {
    let issues = game_finder::validate_game_folder(game);
    for issue in &issues {
        println!("Warning: {}", issue);
    }
    if !game.is_dir() {
        bail!("Game folder doesn't exist: {}", game.display());
    }
    if game_finder::find_executable(game).is_none() && !force {
        bail!("{} doesn't look like a game folder (use --force to install anyway)", game.display());
    }

    match system::free_space_gb(game) {
        Some(free) if free < settings.min_free_space_gb as f64 => {
            let msg = format!(
                "Only {:.1} GB free, at least {} GB recommended",
                free, settings.min_free_space_gb
            );
            if !force {
                bail!("{} (use --force to install anyway)", msg);
            }
            println!("Warning: {}", msg);
        }
        Some(free) => info!("Free space: {:.1} GB", free),
        None => warn!("Could not determine free space for {}", game.display()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose)?;
    let mut settings = Settings::load();

    match cli.command {
        Commands::List { game, all } => {
            let game = game.or_else(|| settings.game_path.clone());
            let online = settings.use_remote_catalog && check_online(cli.offline).await;
            let catalog = load_catalog(&settings, online).await;
            let installed = game
                .as_deref()
                .map(game_finder::installed_ids)
                .unwrap_or_default();

            let filter = if all { None } else { Some(&installed) };
            for (category, packages) in catalog.grouped(filter) {
                println!("\n=== {} ===", category.label());
                for package in packages {
                    let parts = if package.source.is_multipart() {
                        format!(" ({} parts)", package.source.file_count())
                    } else {
                        String::new()
                    };
                    let mark = if installed.contains(&package.id) {
                        "  [installed]"
                    } else {
                        ""
                    };
                    println!("  {:<6} {}{}{}", package.id, package.display_name, parts, mark);
                }
            }

            println!(
                "\n{} packages in catalog, {} installed, {} available",
                catalog.len(),
                installed.len(),
                catalog.available(&installed).count()
            );
        }

        Commands::Install {
            ids,
            game,
            all_missing,
            concurrent,
            force,
        } => {
            if ids.is_empty() && !all_missing {
                bail!("Name at least one package id, or use --all-missing");
            }
            let game = resolve_game(game, &settings)?;
            if !check_online(cli.offline).await {
                bail!("Installing needs an internet connection");
            }
            preflight(&game, &settings, force)?;

            let catalog = load_catalog(&settings, true).await;
            let installed = game_finder::installed_ids(&game);
            let selection = select_packages(&catalog, &installed, &ids, all_missing, force)?;
            if selection.is_empty() {
                println!("Nothing to install.");
                return Ok(());
            }

            let mut config = settings.install_config(&game);
            if let Some(n) = concurrent {
                config.max_concurrent_jobs = n;
            }
            config.validate()?;

            println!("packdrop - installing {} package(s) into {}", selection.len(), game.display());
            println!("Concurrent jobs: {}\n", config.max_concurrent_jobs);

            let mut runner = JobRunner::new(PackageInstaller::new(config)?);
            for package in selection {
                runner.submit(package);
            }
            let ctrl_c = spawn_ctrl_c_handler(&runner);
            let outcomes = run_with_progress(&mut runner).await;
            ctrl_c.abort();

            let stats = InstallStats::from_outcomes(&outcomes);
            println!("\n=== Installation Summary ===");
            println!(
                "Packages: {} installed, {} failed, {} cancelled",
                stats.succeeded.len(),
                stats.failed.len(),
                stats.cancelled.len()
            );
            for (id, reason) in &stats.failed {
                println!("  {}: {}", id, reason);
            }

            if !stats.all_succeeded() {
                bail!("Some packages were not installed. Fix the issues above and run again.");
            }
            println!("\nInstallation complete!");
        }

        Commands::Repair {
            game,
            save_report,
            json,
        } => {
            let game = resolve_game(game, &settings)?;
            let temp_dir = settings.install_config(&game).temp_dir;

            let mut runner = JobRunner::scan_only(&temp_dir);
            runner.submit_repair(game.clone(), ScanOptions::new(temp_dir));
            let ctrl_c = spawn_ctrl_c_handler(&runner);
            let outcome = run_with_progress(&mut runner)
                .await
                .into_iter()
                .next()
                .context("Repair produced no result")?;
            ctrl_c.abort();

            let report = match (outcome.status, outcome.report) {
                (JobStatus::Succeeded, Some(report)) => report,
                (JobStatus::Failed(reason), _) => bail!("Repair failed: {}", reason),
                _ => bail!("Repair cancelled"),
            };

            let text = if json {
                serde_json::to_string_pretty(&report)?
            } else {
                report.render()
            };
            println!("{}", text);
            if let Some(path) = save_report {
                std::fs::write(&path, &text)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Report saved to {}", path.display());
            }
            if !report.is_healthy() {
                bail!("Repair found {} critical error(s)", report.errors.len());
            }
        }

        Commands::Detect => match game_finder::detect_game_path() {
            Some(path) => {
                println!("Found game: {}", path.display());
                settings.game_path = Some(path);
                settings.save()?;
            }
            None => bail!("Game folder not found automatically. Use `packdrop config set-game <DIR>`"),
        },

        Commands::Status { game } => {
            println!("=== packdrop status ===");
            let online = check_online(cli.offline).await;
            println!("Network:    {}", if online { "online" } else { "offline" });

            match ArchiveLocator::with_override(settings.sevenzip_path.clone()).locate() {
                Some(path) => println!("7z:         {}", path.display()),
                None => println!("7z:         not found (needed for multi-part packages)"),
            }

            let Some(game) = game.or_else(|| settings.game_path.clone()) else {
                println!("Game:       not configured (run `packdrop detect`)");
                return Ok(());
            };
            println!("Game:       {}", game.display());
            if let Some(free) = system::free_space_gb(&game) {
                println!("Free space: {:.1} GB", free);
            }
            println!("Installed:  {} package(s)", game_finder::installed_ids(&game).len());

            let issues = game_finder::validate_game_folder(&game);
            if issues.is_empty() {
                println!("Health:     OK");
            } else {
                println!("Health:     {} issue(s)", issues.len());
                for issue in issues {
                    println!("  - {}", issue);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if let Ok(path) = Settings::settings_path() {
                    println!("# {}", path.display());
                }
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            ConfigAction::SetGame { path } => {
                if !path.is_dir() {
                    bail!("Not a directory: {}", path.display());
                }
                for issue in game_finder::validate_game_folder(&path) {
                    println!("Warning: {}", issue);
                }
                settings.game_path = Some(path.canonicalize().unwrap_or(path));
                settings.save()?;
                println!("Game folder saved");
            }
            ConfigAction::SetRemoteCatalog { enabled } => {
                settings.use_remote_catalog = enabled;
                settings.save()?;
                println!("Remote catalog {}", if enabled { "enabled" } else { "disabled" });
            }
        },
    }

    Ok(())
}
