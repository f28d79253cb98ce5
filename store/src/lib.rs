pub mod backend;
pub mod backup;
pub mod bootstrap;
mod error;
pub mod history;
pub mod ids;
pub mod integrity;
pub mod migration;
pub mod model;
pub mod notify;
pub mod repair;
pub mod settings;
pub mod storage;
pub mod version;

pub use backend::{BackendError, FileBackend, KeyValueBackend, MemoryBackend, DEFAULT_CAPACITY_BYTES};
pub use backup::{backup_file_name, export_backup, import_backup, BackupKind, ImportSummary};
pub use bootstrap::{open, open_with, LoadStatus, Session, StartupReport};
pub use error::{EntryError, ImportError, MigrationError, StoreError};
pub use history::{HistoryManager, HistoryStatistics, WinnerCount};
pub use ids::IdGenerator;
pub use integrity::{validate, IntegrityReport, OverallReport, SectionReport};
pub use migration::{migrate_all, MigrationOutcome, MigrationStep, Migrator};
pub use model::{
    AppearanceConfig, AppearancePatch, AppearanceSnapshot, DrawData, DrawRecord, Entry, EntryKind,
    Participant, Prize, SettingsPayload, VersionRecord,
};
pub use notify::{Notification, NotificationLog, NotificationSink, Severity, TracingSink};
pub use repair::{repair, RepairReport};
pub use settings::SettingsManager;
pub use storage::{Storage, StorageKeys, StorageUsage};
pub use version::{compare_versions, BASELINE_VERSION, CURRENT_VERSION};
