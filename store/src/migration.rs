//! Version-indexed schema migrations for stored payloads.
//!
//! The same step table is applied to the settings payload and, separately,
//! to every draw-history record. Each payload's own `version` field is its
//! starting point.

use std::cmp::Ordering;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::backend::KeyValueBackend;
use crate::ids::now_timestamp;
use crate::model::VersionRecord;
use crate::storage::{Storage, StorageKeys};
use crate::version::{compare_versions, BASELINE_VERSION, CURRENT_VERSION};
use crate::MigrationError;

pub type MigrationFn = fn(Value) -> Result<Value, String>;

/// One transform, keyed by the version it upgrades a payload *to*.
#[derive(Clone)]
pub struct MigrationStep {
    pub target_version: &'static str,
    pub description: &'static str,
    pub apply: MigrationFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("target_version", &self.target_version)
            .field("description", &self.description)
            .finish()
    }
}

fn add_snapshot_theme(mut data: Value) -> Result<Value, String> {
    if let Some(settings) = data.get_mut("settings").and_then(Value::as_object_mut) {
        settings
            .entry("theme")
            .or_insert_with(|| Value::String("default".to_string()));
    }
    Ok(data)
}

fn tag_history_records(mut data: Value) -> Result<Value, String> {
    if let Some(records) = data.get_mut("drawHistory").and_then(Value::as_array_mut) {
        for record in records.iter_mut() {
            match record.as_object_mut() {
                Some(obj) => {
                    obj.insert("version".to_string(), json!("1.2.0"));
                }
                None => return Err("draw history contains a non-object record".to_string()),
            }
        }
    }
    Ok(data)
}

/// Steps shipped with this build, in any order.
pub fn default_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep {
            target_version: "1.1.0",
            description: "Tag draw appearance snapshots with a theme",
            apply: add_snapshot_theme,
        },
        MigrationStep {
            target_version: "1.2.0",
            description: "Stamp schema version on exported draw records",
            apply: tag_history_records,
        },
    ]
}

/// Applies registered steps in ascending target-version order.
#[derive(Debug, Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
    current_version: String,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(default_steps(), CURRENT_VERSION)
    }
}

impl Migrator {
    /// Steps targeting versions above `current_version` are dropped.
    pub fn new(mut steps: Vec<MigrationStep>, current_version: &str) -> Self {
        steps.retain(|s| compare_versions(s.target_version, current_version) != Ordering::Greater);
        steps.sort_by(|a, b| compare_versions(a.target_version, b.target_version));
        Self {
            steps,
            current_version: current_version.to_string(),
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// The payload's own version, or the baseline when it has none.
    pub fn version_of(payload: &Value) -> &str {
        payload
            .get("version")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or(BASELINE_VERSION)
    }

    /// True when `payload` is older than the current schema.
    pub fn needs_migration(&self, payload: &Value) -> bool {
        compare_versions(Self::version_of(payload), &self.current_version) == Ordering::Less
    }

    /// Run every step newer than `from_version`, then stamp the payload
    /// with the current version and a fresh `lastMigrated`.
    pub fn migrate(&self, payload: Value, from_version: &str) -> Result<Value, MigrationError> {
        let mut data = payload;
        let mut tracked = from_version.to_string();

        for step in &self.steps {
            if compare_versions(&tracked, step.target_version) != Ordering::Less {
                continue;
            }
            debug!(from = %tracked, to = step.target_version, step = step.description, "Applying migration step");
            data = (step.apply)(data).map_err(|cause| {
                error!(target_version = step.target_version, %cause, "Migration step failed");
                MigrationError::Step {
                    target_version: step.target_version.to_string(),
                    cause,
                }
            })?;
            tracked = step.target_version.to_string();
        }

        if let Some(obj) = data.as_object_mut() {
            obj.insert("version".to_string(), json!(self.current_version));
            obj.insert("lastMigrated".to_string(), json!(now_timestamp()));
        }
        Ok(data)
    }

    /// Migrate a payload from its own recorded version.
    pub fn migrate_payload(&self, payload: Value) -> Result<Value, MigrationError> {
        let from = Self::version_of(&payload).to_string();
        self.migrate(payload, &from)
    }
}

/// What a full migration pass produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MigrationOutcome {
    pub settings: Option<Value>,
    pub draw_history: Vec<Value>,
    pub settings_migrated: bool,
    pub records_migrated: usize,
    pub errors: Vec<String>,
}

impl MigrationOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn migrate_settings<B: KeyValueBackend>(
    storage: &Storage<B>,
    migrator: &Migrator,
    outcome: &mut MigrationOutcome,
) {
    let Some(saved) = storage.load_value(StorageKeys::SETTINGS) else {
        debug!("No settings found, nothing to migrate");
        return;
    };

    if !migrator.needs_migration(&saved) {
        debug!("Settings are up to date");
        outcome.settings = Some(saved);
        return;
    }

    info!(
        from = Migrator::version_of(&saved),
        to = migrator.current_version(),
        "Settings migration needed"
    );
    match migrator.migrate_payload(saved.clone()) {
        Ok(migrated) => {
            storage.save(StorageKeys::SETTINGS, &migrated);
            outcome.settings_migrated = true;
            outcome.settings = Some(migrated);
            info!("Settings migration completed");
        }
        Err(err) => {
            warn!(error = %err, "Settings migration failed, keeping stored data");
            outcome.errors.push(format!("Settings: {}", err));
            outcome.settings = Some(saved);
        }
    }
}

fn migrate_history<B: KeyValueBackend>(
    storage: &Storage<B>,
    migrator: &Migrator,
    outcome: &mut MigrationOutcome,
) {
    let records = match storage.load_value(StorageKeys::DRAW_HISTORY) {
        Some(Value::Array(records)) => records,
        _ => {
            debug!("No draw history found");
            return;
        }
    };

    let mut migrated = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        if !migrator.needs_migration(&record) {
            migrated.push(record);
            continue;
        }
        match migrator.migrate_payload(record.clone()) {
            Ok(upgraded) => {
                outcome.records_migrated += 1;
                migrated.push(upgraded);
            }
            Err(err) => {
                warn!(index, error = %err, "Draw record migration failed, keeping record as is");
                outcome.errors.push(format!("Draw History: record {}: {}", index, err));
                migrated.push(record);
            }
        }
    }

    if outcome.records_migrated > 0 {
        storage.save(StorageKeys::DRAW_HISTORY, &migrated);
        info!(records = outcome.records_migrated, "Draw history migration completed");
    } else {
        debug!("Draw history is up to date");
    }
    outcome.draw_history = migrated;
}

/// Migrate both stored payload families, then overwrite the version record.
pub fn migrate_all<B: KeyValueBackend>(storage: &Storage<B>, migrator: &Migrator) -> MigrationOutcome {
    info!("Starting data migration process");
    let mut outcome = MigrationOutcome::default();

    migrate_settings(storage, migrator, &mut outcome);
    migrate_history(storage, migrator, &mut outcome);

    let record = VersionRecord {
        version: migrator.current_version().to_string(),
        migration_date: now_timestamp(),
        migration_errors: outcome.errors.clone(),
    };
    storage.save(StorageKeys::APP_VERSION, &record);

    info!(
        settings_migrated = outcome.settings_migrated,
        records_migrated = outcome.records_migrated,
        errors = outcome.errors.len(),
        "Data migration process completed"
    );
    outcome
}

/// The version record written by the last migration pass, if any.
pub fn load_version_record<B: KeyValueBackend>(storage: &Storage<B>) -> Option<VersionRecord> {
    storage.load(StorageKeys::APP_VERSION, None)
}
