//! Command handlers. Each one works on an opened session or, for the
//! maintenance commands, directly on the store.

use std::path::{Path, PathBuf};

use lottery_draw::{draw, BoundedRandom, DrawError, DrawMode, LocalRandom, RandomSource, SeededRandom};
use lottery_store::ids::today;
use lottery_store::{
    backup_file_name, export_backup, import_backup, repair, validate, AppearancePatch, BackupKind,
    DrawRecord, Entry, EntryError, EntryKind, FileBackend, ImportError, Session, Storage, StoreError,
};
use tracing::info;

use crate::config;

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0} is destructive; pass --yes to confirm")]
    ConfirmationRequired(&'static str),
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: i64 },
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not clear stored data")]
    ClearFailed,
}

fn confirm(yes: bool, what: &'static str) -> Result<(), CliError> {
    if yes {
        Ok(())
    } else {
        Err(CliError::ConfirmationRequired(what))
    }
}

fn print_entries(kind: EntryKind, entries: &[Entry]) {
    if entries.is_empty() {
        println!("No {}s.", kind.label());
        return;
    }
    for entry in entries {
        println!("{:>15}  {}", entry.id, entry.name);
    }
}

fn print_record(record: &DrawRecord) {
    println!(
        "{:>15}  {} {}  {} -> {} ({} participants)",
        record.id, record.date, record.time, record.prize, record.winner, record.total_participants
    );
}

pub fn add_entries(
    session: &mut Session<FileBackend>,
    kind: EntryKind,
    names: &[String],
) -> Result<(), CliError> {
    for name in names {
        let id = session.settings.add(kind, name)?;
        println!("Added {} {} ({})", kind.label(), name.trim(), id);
    }
    Ok(())
}

pub fn remove_entry(session: &mut Session<FileBackend>, kind: EntryKind, id: i64) -> Result<(), CliError> {
    if !session.settings.remove(kind, id) {
        return Err(CliError::NotFound {
            kind: kind.label(),
            id,
        });
    }
    println!("Removed {} {}", kind.label(), id);
    Ok(())
}

pub fn list_entries(session: &Session<FileBackend>, kind: EntryKind) {
    print_entries(kind, session.settings.entries(kind));
}

pub fn clear_entries(session: &mut Session<FileBackend>, kind: EntryKind, yes: bool) -> Result<(), CliError> {
    confirm(yes, "clearing a list")?;
    session.settings.clear(kind);
    println!("Cleared all {}s", kind.label());
    Ok(())
}

pub fn show_appearance(session: &Session<FileBackend>) {
    let appearance = session.settings.appearance();
    println!("background: {}", appearance.bg_color);
    println!("text:       {}", appearance.text_color);
    println!("accent:     {}", appearance.accent_color);
    println!("message:    {}", appearance.win_message);
}

pub fn set_appearance(session: &mut Session<FileBackend>, patch: AppearancePatch) {
    if patch.is_empty() {
        println!("Nothing to change.");
        return;
    }
    session.settings.update_appearance(patch);
    show_appearance(session);
}

pub fn reset_appearance(session: &mut Session<FileBackend>) {
    session.settings.reset_appearance();
    show_appearance(session);
}

async fn draw_with<P: RandomSource>(
    session: &mut Session<FileBackend>,
    random: BoundedRandom<P>,
    mode: DrawMode,
) -> Result<(), CliError> {
    let outcome = draw(&mut session.settings, &mut session.history, &random, mode).await?;
    println!("{}", session.settings.appearance().win_message);
    println!("{} wins {}!", outcome.winner, outcome.prize);
    println!(
        "Drawn from {} participants, {} prizes remaining.",
        outcome.total_participants, outcome.remaining_prizes
    );
    Ok(())
}

pub async fn run_draw(session: &mut Session<FileBackend>, keep: bool, seed: Option<u64>) -> Result<(), CliError> {
    let mode = if keep { DrawMode::Keep } else { DrawMode::Consume };
    let timeout = config::get_random_timeout();
    match seed {
        Some(seed) => draw_with(session, BoundedRandom::with_timeout(SeededRandom::new(seed), timeout), mode).await,
        None => draw_with(session, BoundedRandom::with_timeout(LocalRandom, timeout), mode).await,
    }
}

pub struct HistoryFilter {
    pub date: Option<String>,
    pub prize: Option<String>,
    pub winner: Option<String>,
}

pub fn list_history(session: &Session<FileBackend>, filter: HistoryFilter) {
    let history = &session.history;
    let mut records: Vec<&DrawRecord> = match (&filter.date, &filter.prize, &filter.winner) {
        (Some(date), _, _) => history.draws_by_date(date),
        (None, Some(prize), _) => history.draws_by_prize(prize),
        (None, None, Some(winner)) => history.draws_by_winner(winner),
        (None, None, None) => history.records().iter().collect(),
    };
    if let Some(prize) = &filter.prize {
        records.retain(|r| &r.prize == prize);
    }
    if let Some(winner) = &filter.winner {
        records.retain(|r| &r.winner == winner);
    }

    if records.is_empty() {
        println!("No draws recorded.");
        return;
    }
    for record in records {
        print_record(record);
    }
}

pub fn remove_history_record(session: &mut Session<FileBackend>, id: i64) -> Result<(), CliError> {
    if !session.history.remove_draw_record(id) {
        return Err(CliError::NotFound { kind: "draw", id });
    }
    println!("Removed draw {}", id);
    Ok(())
}

pub fn clear_history(session: &mut Session<FileBackend>, yes: bool) -> Result<(), CliError> {
    confirm(yes, "clearing the draw history")?;
    session.history.clear();
    println!("Draw history cleared");
    Ok(())
}

pub fn history_stats(session: &Session<FileBackend>, json: bool) {
    let stats = session.history.statistics();
    if json {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap_or_default());
        return;
    }
    println!("Total draws:    {}", stats.total_draws);
    println!("Unique prizes:  {}", stats.unique_prizes);
    println!("Unique winners: {}", stats.unique_winners);
    match &stats.most_frequent_winner {
        Some(top) => println!("Top winner:     {} ({} wins)", top.name, top.count),
        None => println!("Top winner:     -"),
    }
    if !stats.recent_draws.is_empty() {
        println!("Recent draws:");
        for record in &stats.recent_draws {
            print_record(record);
        }
    }
}

pub fn export(session: &Session<FileBackend>, kind: BackupKind, output: Option<PathBuf>) -> Result<(), CliError> {
    let document = export_backup(kind, &session.settings, &session.history);
    let path = output.unwrap_or_else(|| PathBuf::from(backup_file_name(kind, &today())));
    if path == Path::new("-") {
        println!("{}", document);
        return Ok(());
    }
    std::fs::write(&path, document).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), ?kind, "Backup written");
    println!("Backup written to {}", path.display());
    Ok(())
}

pub fn import(
    session: &mut Session<FileBackend>,
    file: &Path,
    kind: BackupKind,
    replace: bool,
) -> Result<(), CliError> {
    let text = std::fs::read_to_string(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let summary = import_backup(&text, kind, replace, &mut session.settings, &mut session.history)?;
    if summary.settings_imported {
        println!(
            "Imported settings: {} prizes, {} participants",
            session.settings.prizes().len(),
            session.settings.participants().len()
        );
    }
    if let Some(added) = summary.records_added {
        println!("Imported {} draw records ({} total)", added, session.history.len());
    }
    Ok(())
}

pub fn run_validate(storage: &Storage<FileBackend>) -> bool {
    let report = validate(storage);
    if report.overall.valid {
        println!("Stored data is valid.");
        return true;
    }
    println!("Found {} problem(s):", report.overall.errors);
    for issue in report.all_issues() {
        println!("  {}", issue);
    }
    false
}

pub fn run_repair(storage: &Storage<FileBackend>, yes: bool) -> Result<(), CliError> {
    confirm(yes, "repair")?;
    let report = repair(storage)?;
    if !report.changed_anything() {
        println!("Nothing to repair.");
        return Ok(());
    }
    if report.settings_reset {
        println!("Settings were reset to defaults.");
    }
    if report.records_removed > 0 {
        println!("Removed {} malformed draw record(s).", report.records_removed);
    }
    Ok(())
}

pub fn show_usage(storage: &Storage<FileBackend>) {
    let usage = storage.usage();
    println!(
        "Used {} bytes, {} available ({:.2}%)",
        usage.used, usage.available, usage.percentage
    );
}

pub fn clear_all(storage: &Storage<FileBackend>, yes: bool) -> Result<(), CliError> {
    confirm(yes, "clear-all")?;
    if !storage.clear_all() {
        return Err(CliError::ClearFailed);
    }
    println!("All stored data removed.");
    Ok(())
}
