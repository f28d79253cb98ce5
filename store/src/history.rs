use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::backend::KeyValueBackend;
use crate::ids::{local_date_time, now_timestamp, IdGenerator};
use crate::integrity::record_is_intact;
use crate::migration::Migrator;
use crate::model::{DrawData, DrawRecord};
use crate::storage::{Storage, StorageKeys};
use crate::version::CURRENT_VERSION;
use crate::ImportError;

const RECENT_DRAWS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WinnerCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatistics {
    pub total_draws: usize,
    pub unique_prizes: usize,
    pub unique_winners: usize,
    pub most_frequent_winner: Option<WinnerCount>,
    pub recent_draws: Vec<DrawRecord>,
}

/// Records decoded from a stored list, plus the values set aside: ones that
/// do not parse and ones repeating an id already taken.
#[derive(Debug, Default)]
struct DecodedRecords {
    records: Vec<DrawRecord>,
    unreadable: Vec<Value>,
}

fn decode_records(raw: Vec<Value>, ids: &IdGenerator) -> DecodedRecords {
    let mut seen = HashSet::new();
    let mut decoded = DecodedRecords::default();
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<DrawRecord>(value.clone()) {
            Ok(record) if seen.insert(record.id) => {
                ids.observe(record.id);
                decoded.records.push(record);
            }
            Ok(record) => {
                warn!(index, id = record.id, "Keeping draw record with duplicate id as stored");
                decoded.unreadable.push(value);
            }
            Err(err) => {
                warn!(index, %err, "Keeping unreadable draw record as stored");
                if let Some(id) = value.get("id").and_then(Value::as_i64) {
                    ids.observe(id);
                }
                decoded.unreadable.push(value);
            }
        }
    }
    decoded
}

/// In-memory owner of the draw history, newest first.
///
/// Records that cannot be decoded are kept as stored and written back after
/// the readable ones. Only repair removes them.
pub struct HistoryManager<B> {
    storage: Arc<Storage<B>>,
    ids: Arc<IdGenerator>,
    records: Vec<DrawRecord>,
    unreadable: Vec<Value>,
}

impl<B: KeyValueBackend> HistoryManager<B> {
    pub fn load(storage: Arc<Storage<B>>, ids: Arc<IdGenerator>) -> Self {
        let decoded = match storage.load_value(StorageKeys::DRAW_HISTORY) {
            Some(Value::Array(raw)) => decode_records(raw, &ids),
            Some(_) => {
                warn!("Stored draw history is not a list, starting empty");
                DecodedRecords::default()
            }
            None => DecodedRecords::default(),
        };
        info!(
            records = decoded.records.len(),
            unreadable = decoded.unreadable.len(),
            "Draw history loaded"
        );
        Self {
            storage,
            ids,
            records: decoded.records,
            unreadable: decoded.unreadable,
        }
    }

    pub fn records(&self) -> &[DrawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored records that could not be read.
    pub fn unreadable(&self) -> &[Value] {
        &self.unreadable
    }

    /// Readable records followed by the unreadable ones, as stored.
    pub fn stored_records(&self) -> Vec<Value> {
        self.records
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .chain(self.unreadable.iter().cloned())
            .collect()
    }

    fn persist(&self) {
        if self.storage.save(StorageKeys::DRAW_HISTORY, &self.stored_records()) {
            debug!(
                records = self.records.len(),
                unreadable = self.unreadable.len(),
                "Draw history saved"
            );
        }
    }

    /// Stamp a completed draw and put it at the front of the history.
    pub fn add_draw_record(&mut self, data: DrawData) -> i64 {
        let (date, time) = local_date_time();
        let record = DrawRecord {
            id: self.ids.next_id(),
            timestamp: now_timestamp(),
            date,
            time,
            prize: data.prize,
            winner: data.winner,
            total_participants: data.total_participants,
            participants_list: data.participants_list,
            settings: data.settings,
            version: Some(CURRENT_VERSION.to_string()),
            last_migrated: None,
            extra: Default::default(),
        };
        let id = record.id;
        info!(id, prize = %record.prize, winner = %record.winner, "Draw recorded");
        self.records.insert(0, record);
        self.persist();
        id
    }

    pub fn remove_draw_record(&mut self, id: i64) -> bool {
        let before = self.records.len() + self.unreadable.len();
        self.records.retain(|r| r.id != id);
        self.unreadable
            .retain(|v| v.get("id").and_then(Value::as_i64) != Some(id));
        let removed = self.records.len() + self.unreadable.len() != before;
        self.persist();
        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.unreadable.clear();
        self.persist();
    }

    pub fn draws_by_date(&self, date: &str) -> Vec<&DrawRecord> {
        self.records.iter().filter(|r| r.date == date).collect()
    }

    pub fn draws_by_prize(&self, prize: &str) -> Vec<&DrawRecord> {
        self.records.iter().filter(|r| r.prize == prize).collect()
    }

    pub fn draws_by_winner(&self, winner: &str) -> Vec<&DrawRecord> {
        self.records.iter().filter(|r| r.winner == winner).collect()
    }

    pub fn statistics(&self) -> HistoryStatistics {
        let unique_prizes = self.records.iter().map(|r| &r.prize).collect::<HashSet<_>>().len();

        // Insertion order decides ties, so keep first-seen order alongside counts.
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            let count = counts.entry(record.winner.as_str()).or_insert_with(|| {
                order.push(record.winner.as_str());
                0
            });
            *count += 1;
        }

        let mut most_frequent_winner: Option<WinnerCount> = None;
        for name in &order {
            let count = counts[name];
            if most_frequent_winner.as_ref().map_or(true, |best| count > best.count) {
                most_frequent_winner = Some(WinnerCount {
                    name: name.to_string(),
                    count,
                });
            }
        }

        HistoryStatistics {
            total_draws: self.records.len(),
            unique_prizes,
            unique_winners: order.len(),
            most_frequent_winner,
            recent_draws: self.records.iter().take(RECENT_DRAWS).cloned().collect(),
        }
    }

    /// The `{drawHistory}` wrapper used by history backups.
    pub fn export_value(&self) -> Value {
        json!({
            "drawHistory": self.stored_records(),
            "exportedAt": now_timestamp(),
            "totalRecords": self.records.len() + self.unreadable.len(),
            "version": CURRENT_VERSION,
        })
    }

    pub fn export(&self) -> String {
        serde_json::to_string_pretty(&self.export_value()).unwrap_or_default()
    }

    /// Migrate and decode the records of a history wrapper without applying them.
    pub(crate) fn prepare_import(value: Value) -> Result<Vec<Value>, ImportError> {
        let Some(Value::Array(raw)) = value.get("drawHistory").cloned() else {
            return Err(ImportError::Shape("expected an object with a drawHistory list"));
        };
        let migrator = Migrator::default();
        raw.into_iter()
            .map(|record| {
                if migrator.needs_migration(&record) {
                    migrator.migrate_payload(record).map_err(ImportError::from)
                } else {
                    Ok(record)
                }
            })
            .collect()
    }

    pub(crate) fn apply_import(&mut self, raw: Vec<Value>, replace_existing: bool) -> usize {
        let mut imported = decode_records(raw, &self.ids);
        imported.unreadable.retain(|value| {
            let intact = record_is_intact(value);
            if !intact {
                warn!("Skipping imported draw record that fails integrity checks");
            }
            intact
        });

        let added = if replace_existing {
            self.records = imported.records;
            self.unreadable = imported.unreadable;
            self.records.len() + self.unreadable.len()
        } else {
            // Ids keyed by their JSON text, so `17` and `"17"` stay distinct.
            let mut existing: HashSet<String> = self
                .records
                .iter()
                .map(|r| Value::from(r.id).to_string())
                .chain(self.unreadable.iter().filter_map(|v| v.get("id").map(Value::to_string)))
                .collect();
            let before = self.records.len() + self.unreadable.len();
            for record in imported.records {
                if existing.insert(Value::from(record.id).to_string()) {
                    self.records.push(record);
                }
            }
            for value in imported.unreadable {
                if value.get("id").is_some_and(|id| existing.insert(id.to_string())) {
                    self.unreadable.push(value);
                }
            }
            self.records.len() + self.unreadable.len() - before
        };
        self.persist();
        info!(added, replace_existing, total = self.records.len(), "Draw history imported");
        added
    }

    /// Import an already-parsed history wrapper. Returns how many records were added.
    pub fn import_value(&mut self, value: Value, replace_existing: bool) -> Result<usize, ImportError> {
        let raw = Self::prepare_import(value)?;
        Ok(self.apply_import(raw, replace_existing))
    }

    /// Import a history export. On failure nothing changes.
    pub fn import(&mut self, json: &str, replace_existing: bool) -> Result<usize, ImportError> {
        let value: Value = serde_json::from_str(json)?;
        self.import_value(value, replace_existing)
    }
}
