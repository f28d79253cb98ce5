use serde_json::Value;
use tracing::info;

use crate::backend::KeyValueBackend;
use crate::ids::now_timestamp;
use crate::integrity::{record_is_intact, validate};
use crate::model::SettingsPayload;
use crate::storage::{Storage, StorageKeys};
use crate::StoreError;

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    pub settings_reset: bool,
    pub records_removed: usize,
}

impl RepairReport {
    pub fn changed_anything(&self) -> bool {
        self.settings_reset || self.records_removed > 0
    }
}

/// Replace invalid settings with defaults and drop malformed draw records.
///
/// A store that already validates is left untouched. Errors come only from
/// failed writes.
pub fn repair<B: KeyValueBackend>(storage: &Storage<B>) -> Result<RepairReport, StoreError> {
    let validation = validate(storage);
    let mut report = RepairReport::default();

    if validation.overall.valid {
        info!("No data corruption detected");
        return Ok(report);
    }

    info!(errors = validation.overall.errors, "Attempting to repair corrupted data");

    if !validation.settings.valid {
        storage.try_save(StorageKeys::SETTINGS, &SettingsPayload::fresh(now_timestamp()))?;
        report.settings_reset = true;
        info!("Settings data repaired with defaults");
    }

    if !validation.draw_history.valid {
        let records = match storage.read_value(StorageKeys::DRAW_HISTORY) {
            Ok(Some(Value::Array(records))) => records,
            _ => Vec::new(),
        };
        let before = records.len();
        let clean: Vec<Value> = records.into_iter().filter(record_is_intact).collect();
        report.records_removed = before - clean.len();

        storage.try_save(StorageKeys::DRAW_HISTORY, &clean)?;
        info!(removed = report.records_removed, "Draw history repaired");
    }

    Ok(report)
}
