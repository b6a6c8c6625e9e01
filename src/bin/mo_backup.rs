use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mo_backup::app::Reconciler;
use mo_backup::archive::ObservationArchive;
use mo_backup::catalog::CatalogHttpClient;
use mo_backup::config::{ConfigLoader, ConfigOverrides};
use mo_backup::domain::{ImageSize, RunMode};
use mo_backup::error::BackupError;
use mo_backup::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "mo-backup")]
#[command(about = "Create or update a zip backup of a user's Mushroom Observer observations")]
#[command(version, author)]
struct Cli {
    /// Print the run summary as JSON.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (default: mo-backup.json if present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Username or id whose observations are archived.
    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    image_size: Option<ImageSize>,

    /// Archive to create or update (default: <user>-mo-bkp.zip).
    #[arg(long, global = true)]
    archive: Option<String>,

    /// Ids per detail request in snapshot mode.
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[arg(long, global = true)]
    base_url: Option<String>,

    /// HTTP timeout per request; reqwest's default when unset.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Archive observations and photos missing from the archive (default)")]
    Sync,
    #[command(about = "Write all observation details as a single <user>.json entry")]
    Snapshot,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BackupError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BackupError) -> u8 {
    match error {
        BackupError::UserNotFound { .. }
        | BackupError::MissingUser
        | BackupError::InvalidUser(_)
        | BackupError::InvalidImageSize(_)
        | BackupError::ConfigRead(_)
        | BackupError::ConfigParse(_)
        | BackupError::InvalidConfig(_) => 2,
        BackupError::Interrupted => 130,
        BackupError::CatalogHttp(_)
        | BackupError::CatalogStatus { .. }
        | BackupError::MalformedResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let mode = match cli.command {
        Some(Commands::Snapshot) => RunMode::Snapshot,
        Some(Commands::Sync) | None => RunMode::Sync,
    };

    let overrides = ConfigOverrides {
        user: cli.user,
        image_size: cli.image_size,
        backup_archive: cli.archive,
        page_size: cli.page_size,
        base_url: cli.base_url,
        timeout_secs: cli.timeout_secs,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let catalog = CatalogHttpClient::new(&config.base_url, config.timeout)?;

    let mut archive = ObservationArchive::open(&config.backup_archive)?;
    info!(archive = %archive.path(), entries = archive.len(), "archive ready");

    let reconciler = Reconciler::new(config, catalog);
    let stop = reconciler.stop_handle();
    ctrlc::set_handler(move || {
        if !stop.swap(true, Ordering::SeqCst) {
            warn!("stop requested; finishing the current observation");
        }
    })
    .map_err(|err| BackupError::SignalHandler(err.to_string()))?;

    let summary = reconciler.run(mode, &mut archive)?;
    archive.finish()?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Interactive => TextOutput::print_summary(&summary).into_diagnostic()?,
    }
    if summary.interrupted {
        return Err(BackupError::Interrupted.into());
    }
    Ok(())
}
