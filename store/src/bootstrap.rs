//! Startup sequence: validate, repair, migrate, then load the managers.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::backend::KeyValueBackend;
use crate::history::HistoryManager;
use crate::ids::IdGenerator;
use crate::integrity::{validate, IntegrityReport};
use crate::migration::{migrate_all, MigrationOutcome, Migrator};
use crate::notify::Severity;
use crate::repair::{repair, RepairReport};
use crate::settings::SettingsManager;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    /// Invalid data was found and could not be rewritten.
    RepairFailed,
    MigrationErrors,
    /// The backend could not be written at all.
    LoadFailed,
}

impl LoadStatus {
    fn notification(self) -> Option<(&'static str, Severity)> {
        match self {
            LoadStatus::Success => None,
            LoadStatus::RepairFailed => Some((
                "Some saved data was damaged and could not be repaired. Defaults are in use.",
                Severity::Warning,
            )),
            LoadStatus::MigrationErrors => Some((
                "Some saved data could not be upgraded to the current version.",
                Severity::Warning,
            )),
            LoadStatus::LoadFailed => Some((
                "Saved data could not be loaded. Changes may not be kept.",
                Severity::Error,
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartupReport {
    pub status: LoadStatus,
    pub integrity: IntegrityReport,
    pub repair: Option<RepairReport>,
    pub migration: MigrationOutcome,
}

/// Everything the application needs after startup.
pub struct Session<B> {
    pub storage: Arc<Storage<B>>,
    pub settings: SettingsManager<B>,
    pub history: HistoryManager<B>,
    pub report: StartupReport,
}

/// Bring stored data up to date and load both managers.
///
/// Always returns usable managers; problems are reported in the status.
pub fn open<B: KeyValueBackend>(storage: Arc<Storage<B>>) -> Session<B> {
    open_with(storage, &Migrator::default())
}

pub fn open_with<B: KeyValueBackend>(storage: Arc<Storage<B>>, migrator: &Migrator) -> Session<B> {
    info!("Initializing application data");
    let mut status = LoadStatus::Success;

    let available = storage.is_available();
    if !available {
        status = LoadStatus::LoadFailed;
    }

    let integrity = validate(&storage);
    let mut repair_report = None;
    if !integrity.overall.valid {
        warn!(issues = ?integrity.all_issues(), "Data corruption detected");
        match repair(&storage) {
            Ok(report) => repair_report = Some(report),
            Err(err) => {
                error!(error = %err, "Data repair failed");
                if status == LoadStatus::Success {
                    status = LoadStatus::RepairFailed;
                }
            }
        }
    }

    let migration = migrate_all(&storage, migrator);
    if !migration.is_clean() && status == LoadStatus::Success {
        warn!(errors = ?migration.errors, "Migration finished with errors");
        status = LoadStatus::MigrationErrors;
    }

    let ids = Arc::new(IdGenerator::new());
    let settings = SettingsManager::load(storage.clone(), ids.clone());
    let history = HistoryManager::load(storage.clone(), ids);

    if let Some((message, severity)) = status.notification() {
        storage.notify(message, severity);
    }
    info!(?status, "Application data initialized");

    Session {
        storage,
        settings,
        history,
        report: StartupReport {
            status,
            integrity,
            repair: repair_report,
            migration,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FailingBackend;
    use crate::backend::{KeyValueBackend, MemoryBackend};
    use crate::migration::MigrationStep;
    use crate::notify::NotificationLog;
    use crate::storage::StorageKeys;
    use serde_json::{json, Value};

    fn failing(_: Value) -> Result<Value, String> {
        Err("boom".to_string())
    }

    fn logged(backend: MemoryBackend) -> (Arc<Storage<MemoryBackend>>, Arc<NotificationLog>) {
        let log = Arc::new(NotificationLog::new());
        (Arc::new(Storage::with_sink(backend, log.clone())), log)
    }

    #[test]
    fn test_clean_start() {
        let (storage, log) = logged(MemoryBackend::new());
        let session = open(storage);
        assert_eq!(session.report.status, LoadStatus::Success);
        assert!(session.settings.prizes().is_empty());
        assert!(session.history.is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_repairs_then_loads() {
        let (storage, _log) = logged(MemoryBackend::new());
        storage.save(
            StorageKeys::DRAW_HISTORY,
            &json!([
                {"id": 1, "timestamp": "t", "prize": "P", "winner": "W", "version": "1.2.0"},
                {"id": 2, "timestamp": "t", "prize": "P", "version": "1.2.0"}
            ]),
        );
        let session = open(storage);
        assert_eq!(session.report.status, LoadStatus::Success);
        assert_eq!(session.report.repair.map(|r| r.records_removed), Some(1));
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn test_repair_failure_is_reported() {
        let (storage, log) = logged(MemoryBackend::with_capacity(64));
        storage.backend().set(StorageKeys::SETTINGS, "{bad").unwrap();
        let session = open(storage);
        assert_eq!(session.report.status, LoadStatus::RepairFailed);
        assert!(session.settings.prizes().is_empty());
        assert!(log
            .drain()
            .iter()
            .any(|n| n.message.contains("could not be repaired")));
    }

    #[test]
    fn test_migration_errors_status() {
        let (storage, log) = logged(MemoryBackend::new());
        storage.save(
            StorageKeys::SETTINGS,
            &json!({"prizes": [], "participants": [], "appearance": {}, "version": "1.0.0"}),
        );
        let migrator = Migrator::new(
            vec![MigrationStep {
                target_version: "1.1.0",
                description: "always fails",
                apply: failing,
            }],
            "1.1.0",
        );
        let session = open_with(storage, &migrator);
        assert_eq!(session.report.status, LoadStatus::MigrationErrors);
        assert_eq!(session.report.migration.errors.len(), 1);
        let notes = log.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unwritable_store_is_load_failed() {
        let log = Arc::new(NotificationLog::new());
        let backend = FailingBackend::new().failing_writes(std::io::ErrorKind::PermissionDenied);
        let session = open(Arc::new(Storage::with_sink(backend, log.clone())));
        assert_eq!(session.report.status, LoadStatus::LoadFailed);
        assert!(session.settings.prizes().is_empty());
        assert!(log
            .drain()
            .iter()
            .any(|n| n.severity == Severity::Error && n.message.contains("could not be loaded")));
    }

    #[test]
    fn test_nearly_full_store_starts_normally() {
        let settings = json!({
            "prizes": [{"id": 1, "name": "Gift", "addedAt": "t"}],
            "participants": [],
            "appearance": {},
            "version": "1.2.0"
        });
        // Too little room left for the availability probe.
        let used = (StorageKeys::SETTINGS.len() + settings.to_string().len()) as u64;
        let (storage, _log) = logged(MemoryBackend::with_capacity(used + 4));
        assert!(storage.save(StorageKeys::SETTINGS, &settings));
        assert!(storage.is_available());
        let session = open(storage);
        assert_eq!(session.report.status, LoadStatus::Success);
        assert_eq!(session.settings.prizes().len(), 1);
    }

    #[test]
    fn test_ids_continue_after_loaded_data() {
        let (storage, _log) = logged(MemoryBackend::new());
        let far = chrono::Utc::now().timestamp_millis() + 10_000_000;
        storage.save(
            StorageKeys::DRAW_HISTORY,
            &json!([{"id": far, "timestamp": "t", "prize": "P", "winner": "W", "version": "1.2.0"}]),
        );
        let mut session = open(storage);
        let id = session
            .settings
            .add(crate::model::EntryKind::Prize, "Gift")
            .unwrap();
        assert!(id > far);
    }
}
