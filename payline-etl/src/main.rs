//! payline-etl - ledger migration and settlement CLI
//!
//! Imports spreadsheet exports into the SQLite ledger, generates and locks
//! monthly designer settlements, and manages JSON snapshots for rollback.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use payline_common::config::{resolve_root_folder, TomlConfig};
use payline_common::db::models::RecordKind;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payline_etl::commands::{self, AppContext, MigrateOptions};

/// Command-line arguments for payline-etl
#[derive(Parser, Debug)]
#[command(name = "payline-etl")]
#[command(about = "Ledger migration and settlement pipeline")]
#[command(version)]
struct Cli {
    /// Bootstrap TOML file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder for the database, backups and seed file
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// SQLite database file (overrides the configured location)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import every sheet in a directory, in dependency order
    Migrate {
        #[arg(long)]
        input_dir: PathBuf,
        /// Apply the seed file first
        #[arg(long)]
        seed: bool,
        /// Delete existing records first
        #[arg(long)]
        clear: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Import a single sheet
    Import {
        #[arg(long)]
        file: PathBuf,
        /// Target table (projects, contacts, feeds, team_tasks, mileages, funds)
        #[arg(long)]
        table: RecordKind,
        #[arg(long)]
        dry_run: bool,
    },
    /// Upsert members, channels and categories from a seed document
    Seed {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete every imported record
    Clear {
        #[arg(long)]
        confirm: bool,
    },
    /// Check the database connection and print row counts
    Test,
    /// Compute the settlement for a period (yyyy-MM)
    GenerateSettlement {
        #[arg(long)]
        period: String,
        /// Recompute a draft that already has items
        #[arg(long)]
        force: bool,
    },
    /// Lock a period's settlement
    LockSettlement {
        #[arg(long)]
        period: String,
    },
    /// Snapshot every table
    Backup {
        #[arg(long)]
        name: String,
    },
    /// Restore a snapshot ("latest" for the newest)
    Rollback {
        #[arg(long)]
        name: String,
    },
    /// Verify a snapshot's checksums
    ValidateBackup {
        #[arg(long)]
        name: String,
    },
    /// List snapshots, newest first
    ListBackups,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let level = config.logging.level.as_str();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("payline_etl={level},payline_common={level}")));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Runs the selected command; `Ok(false)` means the command completed but
/// reported a failure
async fn run(cli: Cli) -> Result<bool> {
    let config = TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config)?;

    info!(
        "payline-etl {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), &config);
    info!("Root folder: {}", root_folder.display());
    let ctx = AppContext::open(config, root_folder, cli.database)
        .await
        .context("Failed to initialize ledger")?;

    match cli.command {
        Commands::Migrate {
            input_dir,
            seed,
            clear,
            dry_run,
        } => {
            let options = MigrateOptions {
                input_dir,
                seed,
                clear,
                dry_run,
            };
            println!("{}", commands::run_migrate(&ctx, &options).await?);
        }
        Commands::Import {
            file,
            table,
            dry_run,
        } => {
            println!("{}", commands::run_import(&ctx, &file, table, dry_run).await?);
        }
        Commands::Seed { file } => {
            println!("{}", commands::run_seed(&ctx, file.as_deref()).await?);
        }
        Commands::Clear { confirm } => {
            println!("{}", commands::run_clear(&ctx, confirm).await?);
        }
        Commands::Test => {
            println!("{}", commands::run_test(&ctx).await?);
        }
        Commands::GenerateSettlement { period, force } => {
            println!(
                "{}",
                commands::run_generate_settlement(&ctx, &period, force).await?
            );
        }
        Commands::LockSettlement { period } => {
            let settlement = commands::run_lock_settlement(&ctx, &period).await?;
            println!(
                "Settlement {} locked at {}",
                settlement.period,
                settlement.locked_at.as_deref().unwrap_or("-")
            );
        }
        Commands::Backup { name } => {
            let info = commands::run_backup(&ctx, &name).await?;
            println!("Backup written: {}", info);
        }
        Commands::Rollback { name } => {
            println!("{}", commands::run_rollback(&ctx, &name).await?);
        }
        Commands::ValidateBackup { name } => {
            let validation = commands::run_validate_backup(&ctx, &name).await?;
            println!("{}", validation);
            return Ok(validation.passed());
        }
        Commands::ListBackups => {
            println!("{}", commands::run_list_backups(&ctx)?);
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
