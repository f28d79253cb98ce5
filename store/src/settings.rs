use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::backend::KeyValueBackend;
use crate::ids::{now_timestamp, IdGenerator};
use crate::migration::Migrator;
use crate::model::{AppearanceConfig, AppearancePatch, Entry, EntryKind, SettingsPayload};
use crate::storage::{Storage, StorageKeys};
use crate::version::CURRENT_VERSION;
use crate::{EntryError, ImportError};

/// Entries decoded from a stored list, plus the values that did not decode.
#[derive(Debug, Default)]
pub(crate) struct NormalizedEntries {
    pub(crate) entries: Vec<Entry>,
    pub(crate) unreadable: Vec<Value>,
}

/// Keep entries with a non-empty name, dropping repeated ids and
/// case-insensitively repeated names. The first occurrence wins. Names over
/// the length limit are cut to it. Values that do not decode as an entry are
/// set aside untouched.
pub(crate) fn normalize_entries(kind: EntryKind, raw: &[Value], ids: &IdGenerator) -> NormalizedEntries {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut normalized = NormalizedEntries::default();

    for value in raw {
        let mut entry: Entry = match serde_json::from_value(value.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(kind = kind.label(), %err, "Keeping unreadable entry as stored");
                normalized.unreadable.push(value.clone());
                continue;
            }
        };
        entry.name = entry.name.trim().to_string();
        if entry.name.is_empty() {
            warn!(kind = kind.label(), id = entry.id, "Skipping entry without a name");
            continue;
        }
        let max = kind.max_name_len();
        if entry.name.chars().count() > max {
            warn!(kind = kind.label(), id = entry.id, max, "Truncating over-long entry name");
            entry.name = entry.name.chars().take(max).collect::<String>().trim_end().to_string();
        }
        if !seen_ids.insert(entry.id) || !seen_names.insert(entry.name.to_lowercase()) {
            warn!(kind = kind.label(), id = entry.id, name = %entry.name, "Skipping duplicate entry");
            continue;
        }
        if entry.added_at.is_empty() {
            entry.added_at = now_timestamp();
        }
        ids.observe(entry.id);
        normalized.entries.push(entry);
    }
    normalized
}

/// In-memory owner of prizes, participants, and appearance.
///
/// Every mutation is written through to the store before returning.
pub struct SettingsManager<B> {
    storage: Arc<Storage<B>>,
    ids: Arc<IdGenerator>,
    prizes: Vec<Entry>,
    participants: Vec<Entry>,
    appearance: AppearanceConfig,
    extra: Map<String, Value>,
    /// Stored prize values that do not decode, written back after the readable ones.
    unreadable_prizes: Vec<Value>,
    unreadable_participants: Vec<Value>,
}

impl<B: KeyValueBackend> SettingsManager<B> {
    /// Load settings from the store, falling back to defaults field by field.
    pub fn load(storage: Arc<Storage<B>>, ids: Arc<IdGenerator>) -> Self {
        let mut manager = Self {
            storage,
            ids,
            prizes: Vec::new(),
            participants: Vec::new(),
            appearance: AppearanceConfig::default(),
            extra: Map::new(),
            unreadable_prizes: Vec::new(),
            unreadable_participants: Vec::new(),
        };

        if let Some(saved) = manager.storage.load_value(StorageKeys::SETTINGS) {
            manager.apply_value(&saved);
            if let Some(obj) = saved.as_object() {
                manager.extra = obj
                    .iter()
                    .filter(|(k, _)| !Self::is_known_field(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
            }
        }

        info!(
            prizes = manager.prizes.len(),
            participants = manager.participants.len(),
            "Settings loaded"
        );
        manager
    }

    fn is_known_field(key: &str) -> bool {
        matches!(
            key,
            "prizes" | "participants" | "appearance" | "version" | "lastUpdated" | "lastMigrated" | "exportedAt"
        )
    }

    /// Replace present arrays wholesale and merge appearance over defaults.
    fn apply_value(&mut self, value: &Value) {
        if let Some(raw) = value.get("prizes").and_then(Value::as_array) {
            let normalized = normalize_entries(EntryKind::Prize, raw, &self.ids);
            self.prizes = normalized.entries;
            self.unreadable_prizes = normalized.unreadable;
        }
        if let Some(raw) = value.get("participants").and_then(Value::as_array) {
            let normalized = normalize_entries(EntryKind::Participant, raw, &self.ids);
            self.participants = normalized.entries;
            self.unreadable_participants = normalized.unreadable;
        }
        if let Some(appearance) = value.get("appearance").filter(|a| a.is_object()) {
            self.appearance = AppearanceConfig::from_value(appearance);
        }
    }

    pub fn prizes(&self) -> &[Entry] {
        &self.prizes
    }

    pub fn participants(&self) -> &[Entry] {
        &self.participants
    }

    pub fn entries(&self, kind: EntryKind) -> &[Entry] {
        match kind {
            EntryKind::Prize => &self.prizes,
            EntryKind::Participant => &self.participants,
        }
    }

    fn entries_mut(&mut self, kind: EntryKind) -> &mut Vec<Entry> {
        match kind {
            EntryKind::Prize => &mut self.prizes,
            EntryKind::Participant => &mut self.participants,
        }
    }

    /// Stored values of `kind` that could not be read as entries.
    pub fn unreadable(&self, kind: EntryKind) -> &[Value] {
        match kind {
            EntryKind::Prize => &self.unreadable_prizes,
            EntryKind::Participant => &self.unreadable_participants,
        }
    }

    fn unreadable_mut(&mut self, kind: EntryKind) -> &mut Vec<Value> {
        match kind {
            EntryKind::Prize => &mut self.unreadable_prizes,
            EntryKind::Participant => &mut self.unreadable_participants,
        }
    }

    /// Readable entries followed by the unreadable values, as stored.
    fn stored_entries(&self, kind: EntryKind) -> Vec<Value> {
        self.entries(kind)
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .chain(self.unreadable(kind).iter().cloned())
            .collect()
    }

    pub fn appearance(&self) -> &AppearanceConfig {
        &self.appearance
    }

    /// Current state as a persisted payload.
    pub fn snapshot(&self) -> SettingsPayload {
        SettingsPayload {
            prizes: self.prizes.clone(),
            participants: self.participants.clone(),
            appearance: self.appearance.clone(),
            version: CURRENT_VERSION.to_string(),
            last_updated: now_timestamp(),
            last_migrated: None,
            extra: self.extra.clone(),
        }
    }

    /// The settings document as written to the store.
    fn stored_value(&self) -> Value {
        let mut value = match serde_json::to_value(self.snapshot()) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "Could not encode settings");
                return Value::Null;
            }
        };
        if let Some(obj) = value.as_object_mut() {
            obj.insert("prizes".to_string(), Value::Array(self.stored_entries(EntryKind::Prize)));
            obj.insert(
                "participants".to_string(),
                Value::Array(self.stored_entries(EntryKind::Participant)),
            );
        }
        value
    }

    fn persist(&self) {
        let value = self.stored_value();
        if value.is_null() {
            return;
        }
        if self.storage.save(StorageKeys::SETTINGS, &value) {
            debug!("Settings saved");
        }
    }

    /// Add a prize or participant. Names are trimmed and must be unique
    /// within their collection regardless of case.
    pub fn add(&mut self, kind: EntryKind, name: &str) -> Result<i64, EntryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EntryError::Empty);
        }
        let max = kind.max_name_len();
        if name.chars().count() > max {
            return Err(EntryError::TooLong { max });
        }
        let normalized = name.to_lowercase();
        if self
            .entries(kind)
            .iter()
            .any(|e| e.name.to_lowercase() == normalized)
        {
            warn!(kind = kind.label(), name, "Entry already exists");
            return Err(EntryError::Duplicate(name.to_string()));
        }

        let entry = Entry {
            id: self.ids.next_id(),
            name: name.to_string(),
            added_at: now_timestamp(),
        };
        let id = entry.id;
        self.entries_mut(kind).push(entry);
        self.persist();
        Ok(id)
    }

    /// Remove an entry by id. Returns whether anything was removed.
    pub fn remove(&mut self, kind: EntryKind, id: i64) -> bool {
        let entries = self.entries_mut(kind);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        self.persist();
        removed
    }

    pub fn clear(&mut self, kind: EntryKind) {
        self.entries_mut(kind).clear();
        self.unreadable_mut(kind).clear();
        self.persist();
    }

    pub fn update_appearance(&mut self, patch: AppearancePatch) {
        self.appearance.apply(patch);
        self.persist();
    }

    pub fn reset_appearance(&mut self) {
        self.appearance = AppearanceConfig::default();
        self.persist();
    }

    /// Reset prizes, participants, and appearance to defaults.
    pub fn reset_all(&mut self) {
        self.prizes.clear();
        self.participants.clear();
        self.unreadable_prizes.clear();
        self.unreadable_participants.clear();
        self.appearance = AppearanceConfig::default();
        self.persist();
    }

    /// Export document for a settings-only backup.
    pub fn export_value(&self) -> Value {
        json!({
            "prizes": self.stored_entries(EntryKind::Prize),
            "participants": self.stored_entries(EntryKind::Participant),
            "appearance": self.appearance,
            "version": CURRENT_VERSION,
            "exportedAt": now_timestamp(),
        })
    }

    pub fn export(&self) -> String {
        serde_json::to_string_pretty(&self.export_value()).unwrap_or_default()
    }

    /// Check that `value` could be imported without applying it.
    pub(crate) fn prepare_import(value: Value) -> Result<Value, ImportError> {
        if !value.is_object() {
            return Err(ImportError::Shape("settings must be a JSON object"));
        }
        let migrator = Migrator::default();
        if migrator.needs_migration(&value) {
            return Ok(migrator.migrate_payload(value)?);
        }
        Ok(value)
    }

    pub(crate) fn apply_import(&mut self, value: &Value) {
        self.apply_value(value);
        self.persist();
        info!(
            prizes = self.prizes.len(),
            participants = self.participants.len(),
            "Settings imported"
        );
    }

    /// Import an already-parsed settings document.
    pub fn import_value(&mut self, value: Value) -> Result<(), ImportError> {
        let value = Self::prepare_import(value)?;
        self.apply_import(&value);
        Ok(())
    }

    /// Import a settings document. On failure nothing changes.
    pub fn import(&mut self, json: &str) -> Result<(), ImportError> {
        let value: Value = serde_json::from_str(json)?;
        self.import_value(value)
    }
}
