//! Combined and single-domain backup documents.

use serde_json::{json, Value};
use tracing::info;

use crate::backend::KeyValueBackend;
use crate::history::HistoryManager;
use crate::ids::now_timestamp;
use crate::settings::SettingsManager;
use crate::version::CURRENT_VERSION;
use crate::ImportError;

/// Which part of the data a backup covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupKind {
    #[default]
    All,
    Settings,
    History,
}

/// Suggested file name for a backup taken on `date` (`YYYY-MM-DD`).
pub fn backup_file_name(kind: BackupKind, date: &str) -> String {
    let prefix = match kind {
        BackupKind::All => "rolling-lottery-backup",
        BackupKind::Settings => "settings-backup",
        BackupKind::History => "draw-history-backup",
    };
    format!("{}-{}.json", prefix, date)
}

/// Pretty JSON backup of the requested domains.
pub fn export_backup<B: KeyValueBackend>(
    kind: BackupKind,
    settings: &SettingsManager<B>,
    history: &HistoryManager<B>,
) -> String {
    let document = match kind {
        BackupKind::Settings => settings.export_value(),
        BackupKind::History => history.export_value(),
        BackupKind::All => json!({
            "settings": settings.export_value(),
            "history": { "drawHistory": history.stored_records() },
            "backupDate": now_timestamp(),
            "version": CURRENT_VERSION,
        }),
    };
    info!(?kind, "Backup exported");
    serde_json::to_string_pretty(&document).unwrap_or_default()
}

/// What an import applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub settings_imported: bool,
    pub records_added: Option<usize>,
}

fn section(document: &Value, name: &str, kind: BackupKind) -> Option<Value> {
    match document.get(name) {
        Some(value) if !value.is_null() => Some(value.clone()),
        // A single-domain import also accepts that domain's own export.
        _ if kind != BackupKind::All => Some(document.clone()),
        _ => None,
    }
}

/// Import a backup document.
///
/// Every section present is validated before any of them is applied, so a
/// failure leaves both managers unchanged.
pub fn import_backup<B: KeyValueBackend>(
    json: &str,
    kind: BackupKind,
    replace_history: bool,
    settings: &mut SettingsManager<B>,
    history: &mut HistoryManager<B>,
) -> Result<ImportSummary, ImportError> {
    let document: Value = serde_json::from_str(json)?;
    if !document.is_object() {
        return Err(ImportError::Shape("backup must be a JSON object"));
    }

    let settings_section = match kind {
        BackupKind::All | BackupKind::Settings => section(&document, "settings", kind),
        BackupKind::History => None,
    };
    let history_section = match kind {
        BackupKind::All | BackupKind::History => section(&document, "history", kind),
        BackupKind::Settings => None,
    };
    if settings_section.is_none() && history_section.is_none() {
        return Err(ImportError::Shape("backup contains neither settings nor history"));
    }

    let prepared_settings = settings_section
        .map(SettingsManager::<B>::prepare_import)
        .transpose()?;
    let prepared_history = history_section
        .map(HistoryManager::<B>::prepare_import)
        .transpose()?;

    let mut summary = ImportSummary::default();
    if let Some(value) = prepared_settings {
        settings.apply_import(&value);
        summary.settings_imported = true;
    }
    if let Some(records) = prepared_history {
        summary.records_added = Some(history.apply_import(records, replace_history));
    }
    info!(
        ?kind,
        settings = summary.settings_imported,
        records = ?summary.records_added,
        "Backup imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::ids::IdGenerator;
    use crate::model::{AppearanceSnapshot, DrawData, EntryKind};
    use crate::storage::Storage;
    use std::sync::Arc;

    type Managers = (SettingsManager<MemoryBackend>, HistoryManager<MemoryBackend>);

    fn managers() -> Managers {
        let storage = Arc::new(Storage::new(MemoryBackend::new()));
        let ids = Arc::new(IdGenerator::new());
        (
            SettingsManager::load(storage.clone(), ids.clone()),
            HistoryManager::load(storage, ids),
        )
    }

    fn data(prize: &str, winner: &str) -> DrawData {
        DrawData {
            prize: prize.to_string(),
            winner: winner.to_string(),
            total_participants: 1,
            participants_list: vec![winner.to_string()],
            settings: AppearanceSnapshot::default(),
        }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            backup_file_name(BackupKind::All, "2024-03-01"),
            "rolling-lottery-backup-2024-03-01.json"
        );
        assert_eq!(
            backup_file_name(BackupKind::Settings, "2024-03-01"),
            "settings-backup-2024-03-01.json"
        );
        assert_eq!(
            backup_file_name(BackupKind::History, "2024-03-01"),
            "draw-history-backup-2024-03-01.json"
        );
    }

    #[test]
    fn test_combined_example_import() {
        let (mut settings, mut history) = managers();
        let doc = r#"{"settings":{"prizes":[{"id":1,"name":"A"}],"participants":[],"appearance":{}},"history":{"drawHistory":[]}}"#;
        let summary = import_backup(doc, BackupKind::All, false, &mut settings, &mut history).unwrap();
        assert!(summary.settings_imported);
        assert_eq!(summary.records_added, Some(0));
        assert_eq!(settings.prizes().len(), 1);
        assert_eq!(settings.prizes()[0].name, "A");
        assert!(history.is_empty());
    }

    #[test]
    fn test_combined_roundtrip() {
        let (mut settings, mut history) = managers();
        settings.add(EntryKind::Prize, "Gift").unwrap();
        settings.add(EntryKind::Participant, "Kim").unwrap();
        history.add_draw_record(data("Gift", "Kim"));
        let backup = export_backup(BackupKind::All, &settings, &history);

        let (mut s2, mut h2) = managers();
        import_backup(&backup, BackupKind::All, true, &mut s2, &mut h2).unwrap();
        assert_eq!(s2.prizes(), settings.prizes());
        assert_eq!(s2.participants(), settings.participants());
        assert_eq!(h2.records(), history.records());
    }

    #[test]
    fn test_bad_history_section_leaves_settings_untouched() {
        let (mut settings, mut history) = managers();
        settings.add(EntryKind::Prize, "Keep").unwrap();
        let doc = r#"{"settings":{"prizes":[]},"history":{"records":[]}}"#;
        assert!(matches!(
            import_backup(doc, BackupKind::All, false, &mut settings, &mut history),
            Err(ImportError::Shape(_))
        ));
        assert_eq!(settings.prizes().len(), 1);
    }

    #[test]
    fn test_single_domain_accepts_own_export() {
        let (settings, mut history) = managers();
        history.add_draw_record(data("Gift", "Kim"));
        let exported = export_backup(BackupKind::History, &settings, &history);

        let (mut s2, mut h2) = managers();
        s2.add(EntryKind::Prize, "Untouched").unwrap();
        let summary = import_backup(&exported, BackupKind::History, false, &mut s2, &mut h2).unwrap();
        assert!(!summary.settings_imported);
        assert_eq!(summary.records_added, Some(1));
        assert_eq!(s2.prizes().len(), 1);
    }

    #[test]
    fn test_empty_combined_document_is_rejected() {
        let (mut settings, mut history) = managers();
        assert!(matches!(
            import_backup(r#"{"backupDate":"x"}"#, BackupKind::All, false, &mut settings, &mut history),
            Err(ImportError::Shape(_))
        ));
    }
}
