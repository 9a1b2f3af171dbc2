//! zlv-import - bulk import and owner reconciliation CLI
//!
//! Each subcommand runs one pipeline over one extract and exits with 0 when
//! the run completed, 1 on an unrecoverable error and 130 when interrupted.
//! The report is flushed in every case.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zlv_common::config::TomlConfig;
use zlv_import::commands::{self, ImportOptions};
use zlv_import::db::housings::OnConflict;
use zlv_import::reporter::ReportSummary;
use zlv_import::source::Departments;
use zlv_import::ImportError;

/// Command-line arguments for zlv-import
#[derive(Parser, Debug)]
#[command(name = "zlv-import")]
#[command(about = "Bulk import of housing, owner and building extracts")]
#[command(version)]
struct Cli {
    /// SQLite database file (overrides ZLV_DATABASE and the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// TOML configuration file (overrides ZLV_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct RunFlags {
    /// Decide every record but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first failed record
    #[arg(long)]
    abort_early: bool,

    /// Comma-separated department codes to keep (e.g. 75,92)
    #[arg(long, value_name = "CODES")]
    departments: Option<String>,

    /// Records per batch write
    #[arg(long, env = "ZLV_CHUNK_SIZE")]
    chunk_size: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
enum ConflictMode {
    /// Keep existing housing as is
    #[default]
    Ignore,
    /// Refresh existing housing from the extract
    Merge,
}

impl From<ConflictMode> for OnConflict {
    fn from(mode: ConflictMode) -> Self {
        match mode {
            ConflictMode::Ignore => OnConflict::Ignore,
            ConflictMode::Merge => OnConflict::Merge,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import departmental owners
    Owners {
        file: PathBuf,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Import housing units
    Housings {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = ConflictMode::Ignore)]
        on_conflict: ConflictMode,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Import housing-owner links
    HousingOwners {
        file: PathBuf,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Import building housing counts
    Buildings {
        file: PathBuf,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Merge past extract years into housing
    History {
        file: PathBuf,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Exit vacant housing missing from an extract year
    HousingStatus {
        /// Extract year (`2025` or `lovac-2025`)
        #[arg(long)]
        year: String,
        #[command(flatten)]
        flags: RunFlags,
    },
    /// Reconcile national owners with departmental owners
    ReconcileOwners {
        file: PathBuf,
        #[command(flatten)]
        flags: RunFlags,
    },
}

impl Command {
    fn flags(&self) -> &RunFlags {
        match self {
            Command::Owners { flags, .. }
            | Command::Housings { flags, .. }
            | Command::HousingOwners { flags, .. }
            | Command::Buildings { flags, .. }
            | Command::History { flags, .. }
            | Command::HousingStatus { flags, .. }
            | Command::ReconcileOwners { flags, .. } => flags,
        }
    }
}

/// Initialize tracing: `RUST_LOG` wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match TomlConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("zlv-import: {}", e);
            return ExitCode::from(1);
        }
    };
    init_tracing(&config.logging.level);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    match run(cli, config, cancel).await {
        Ok(summary) => {
            info!("Done: {}", summary);
            ExitCode::SUCCESS
        }
        Err(e) if is_cancelled(&e) => {
            warn!("Import interrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("Import failed: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ImportError>(), Some(ImportError::Cancelled))
}

async fn run(cli: Cli, config: TomlConfig, cancel: CancellationToken) -> Result<ReportSummary> {
    config.import.validate().context("Invalid import settings")?;

    let flags = cli.command.flags().clone();
    let departments = match flags.departments.as_deref() {
        Some(list) => Departments::parse(list).context("Invalid --departments")?,
        None => Departments::default(),
    };
    let options = ImportOptions {
        departments,
        dry_run: flags.dry_run,
        abort_early: flags.abort_early,
        chunk_size: flags.chunk_size,
        settings: config.import.clone(),
        cancel,
    };

    let db_path = config.resolve_database_path(cli.database.as_deref());
    info!(database = %db_path.display(), dry_run = options.dry_run, "Opening database");
    let pool = zlv_import::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let result = match &cli.command {
        Command::Owners { file, .. } => commands::import_owners(&pool, file, &options).await,
        Command::Housings { file, on_conflict, .. } => {
            commands::import_housings(&pool, file, (*on_conflict).into(), &options).await
        }
        Command::HousingOwners { file, .. } => commands::import_housing_owners(&pool, file, &options).await,
        Command::Buildings { file, .. } => commands::import_buildings(&pool, file, &options).await,
        Command::History { file, .. } => commands::import_history(&pool, file, &options).await,
        Command::HousingStatus { year, .. } => commands::transition_housing_status(&pool, year, &options).await,
        Command::ReconcileOwners { file, .. } => commands::reconcile_owners(&pool, file, &options).await,
    };

    pool.close().await;
    result.map_err(|e| with_file_context(e, &cli.command))
}

fn with_file_context(err: ImportError, command: &Command) -> anyhow::Error {
    let file: Option<&Path> = match command {
        Command::Owners { file, .. }
        | Command::Housings { file, .. }
        | Command::HousingOwners { file, .. }
        | Command::Buildings { file, .. }
        | Command::History { file, .. }
        | Command::ReconcileOwners { file, .. } => Some(file.as_path()),
        Command::HousingStatus { .. } => None,
    };
    match file {
        Some(file) => anyhow::Error::new(err).context(format!("Import of {} failed", file.display())),
        None => anyhow::Error::new(err),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping after the current record");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after the current record");
        },
    }
}
