//! rolling-lottery: manage prizes and participants, draw winners, and keep
//! the draw history in a local store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use lottery_store::{
    open, AppearancePatch, BackupKind, EntryKind, FileBackend, LoadStatus, NotificationSink, Severity, Storage,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::HistoryFilter;

#[derive(Parser)]
#[command(name = "rolling-lottery", about = "Prize draws with persistent settings and history")]
struct Cli {
    /// Store directory. Overrides ROLLING_LOTTERY_DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage prizes. The first prize is the one drawn next.
    Prize {
        #[command(subcommand)]
        action: EntryAction,
    },
    /// Manage participants.
    Participant {
        #[command(subcommand)]
        action: EntryAction,
    },
    /// Show or change the draw screen appearance.
    Appearance {
        #[command(subcommand)]
        action: AppearanceAction,
    },
    /// Draw a winner for the next prize.
    Draw {
        /// Keep the prize and the winner in their lists afterwards.
        #[arg(long)]
        keep: bool,
        /// Use a seeded generator for a reproducible draw.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Inspect or edit the draw history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Write a backup file.
    Export {
        #[arg(long, value_enum)]
        only: Option<Section>,
        /// Output path, or `-` for stdout. Defaults to a dated file name.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a backup file.
    Import {
        file: PathBuf,
        #[arg(long, value_enum)]
        only: Option<Section>,
        /// Replace the draw history instead of merging into it.
        #[arg(long)]
        replace: bool,
    },
    /// Check stored data for structural problems without changing it.
    Validate,
    /// Reset invalid settings and drop malformed draw records.
    Repair {
        #[arg(long)]
        yes: bool,
    },
    /// Show how much of the storage capacity is in use.
    Usage,
    /// Delete every stored value.
    ClearAll {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum EntryAction {
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    Remove {
        id: i64,
    },
    List,
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum AppearanceAction {
    Show,
    Set {
        #[arg(long)]
        bg_color: Option<String>,
        #[arg(long)]
        text_color: Option<String>,
        #[arg(long)]
        accent_color: Option<String>,
        #[arg(long)]
        win_message: Option<String>,
    },
    Reset,
}

#[derive(Subcommand)]
enum HistoryAction {
    List {
        /// Local date, `YYYY-MM-DD`.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        prize: Option<String>,
        #[arg(long)]
        winner: Option<String>,
    },
    Remove {
        id: i64,
    },
    Clear {
        #[arg(long)]
        yes: bool,
    },
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Section {
    Settings,
    History,
}

fn backup_kind(only: Option<Section>) -> BackupKind {
    match only {
        None => BackupKind::All,
        Some(Section::Settings) => BackupKind::Settings,
        Some(Section::History) => BackupKind::History,
    }
}

/// Prints store notifications to stderr.
struct StderrSink;

impl NotificationSink for StderrSink {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::info!(%severity, text = message, "Notification shown");
        eprintln!("[{}] {}", severity, message);
    }
}

fn entry_command(
    session: &mut lottery_store::Session<FileBackend>,
    kind: EntryKind,
    action: EntryAction,
) -> Result<(), commands::CliError> {
    match action {
        EntryAction::Add { names } => commands::add_entries(session, kind, &names),
        EntryAction::Remove { id } => commands::remove_entry(session, kind, id),
        EntryAction::List => {
            commands::list_entries(session, kind);
            Ok(())
        }
        EntryAction::Clear { yes } => commands::clear_entries(session, kind, yes),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.unwrap_or_else(config::get_data_dir);
    let log_dir = config::get_log_dir(&data_dir);
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&log_dir, "rolling-lottery");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(data_dir = %data_dir.display(), "rolling-lottery starting up");

    let backend = FileBackend::with_capacity(data_dir, config::get_storage_capacity());
    let storage = Arc::new(Storage::with_sink(backend, Arc::new(StderrSink)));

    // Maintenance commands inspect the raw store before startup repairs it.
    match cli.command {
        Commands::Validate => {
            if !commands::run_validate(&storage) {
                anyhow::bail!("stored data failed validation");
            }
            return Ok(());
        }
        Commands::Repair { yes } => return Ok(commands::run_repair(&storage, yes)?),
        Commands::Usage => {
            commands::show_usage(&storage);
            return Ok(());
        }
        Commands::ClearAll { yes } => return Ok(commands::clear_all(&storage, yes)?),
        command => {
            let mut session = open(storage);
            if session.report.status != LoadStatus::Success {
                tracing::warn!(status = ?session.report.status, "Started with degraded data");
            }
            run(&mut session, command).await?;
        }
    }

    tracing::info!("rolling-lottery shutting down");
    Ok(())
}

async fn run(
    session: &mut lottery_store::Session<FileBackend>,
    command: Commands,
) -> Result<(), commands::CliError> {
    match command {
        Commands::Prize { action } => entry_command(session, EntryKind::Prize, action),
        Commands::Participant { action } => entry_command(session, EntryKind::Participant, action),
        Commands::Appearance { action } => {
            match action {
                AppearanceAction::Show => commands::show_appearance(session),
                AppearanceAction::Set {
                    bg_color,
                    text_color,
                    accent_color,
                    win_message,
                } => commands::set_appearance(
                    session,
                    AppearancePatch {
                        bg_color,
                        text_color,
                        accent_color,
                        win_message,
                    },
                ),
                AppearanceAction::Reset => commands::reset_appearance(session),
            }
            Ok(())
        }
        Commands::Draw { keep, seed } => commands::run_draw(session, keep, seed).await,
        Commands::History { action } => match action {
            HistoryAction::List { date, prize, winner } => {
                commands::list_history(session, HistoryFilter { date, prize, winner });
                Ok(())
            }
            HistoryAction::Remove { id } => commands::remove_history_record(session, id),
            HistoryAction::Clear { yes } => commands::clear_history(session, yes),
            HistoryAction::Stats { json } => {
                commands::history_stats(session, json);
                Ok(())
            }
        },
        Commands::Export { only, output } => commands::export(session, backup_kind(only), output),
        Commands::Import { file, only, replace } => commands::import(session, &file, backup_kind(only), replace),
        Commands::Validate | Commands::Repair { .. } | Commands::Usage | Commands::ClearAll { .. } => Ok(()),
    }
}
