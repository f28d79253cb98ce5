//! Read-only structural checks over the stored payloads.

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::backend::KeyValueBackend;
use crate::storage::{Storage, StorageKeys};
use crate::StoreError;

/// Issues found in one payload family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

impl SectionReport {
    fn from_issues(issues: Vec<String>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverallReport {
    pub valid: bool,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub settings: SectionReport,
    pub draw_history: SectionReport,
    pub overall: OverallReport,
}

impl IntegrityReport {
    /// Every issue, prefixed with the section it belongs to.
    pub fn all_issues(&self) -> Vec<String> {
        self.settings
            .issues
            .iter()
            .map(|i| format!("Settings: {}", i))
            .chain(
                self.draw_history
                    .issues
                    .iter()
                    .map(|i| format!("Draw History: {}", i)),
            )
            .collect()
    }
}

/// Whether a JSON value counts as a populated field: not null, false, zero,
/// or an empty string.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Issues for one draw record, labelled with its position.
pub fn record_issues(index: usize, record: &Value) -> Vec<String> {
    [
        ("id", "ID"),
        ("timestamp", "timestamp"),
        ("winner", "winner"),
        ("prize", "prize"),
    ]
    .iter()
    .filter(|(field, _)| !is_present(record.get(*field)))
    .map(|(_, label)| format!("Record {}: Missing {}", index, label))
    .collect()
}

/// True when a record passes every per-record check.
pub fn record_is_intact(record: &Value) -> bool {
    record_issues(0, record).is_empty()
}

/// Issues for a stored settings value.
pub fn settings_issues(settings: &Value) -> Vec<String> {
    let mut issues = Vec::new();
    if !is_present(settings.get("version")) {
        issues.push("Missing version information".to_string());
    }
    if !settings.get("appearance").is_some_and(Value::is_object) {
        issues.push("Invalid appearance settings".to_string());
    }
    if !settings.get("prizes").is_some_and(Value::is_array) {
        issues.push("Invalid prizes array".to_string());
    }
    if !settings.get("participants").is_some_and(Value::is_array) {
        issues.push("Invalid participants array".to_string());
    }
    issues
}

fn history_issues(history: &Value) -> Vec<String> {
    match history.as_array() {
        Some(records) => records
            .iter()
            .enumerate()
            .flat_map(|(index, record)| record_issues(index, record))
            .collect(),
        None => vec!["Invalid draw history array".to_string()],
    }
}

/// Inspect the stored settings and draw history. Never writes.
pub fn validate<B: KeyValueBackend>(storage: &Storage<B>) -> IntegrityReport {
    let mut internal_failures = 0;

    let settings_issues = match storage.read_value(StorageKeys::SETTINGS) {
        Ok(None) => Vec::new(),
        Ok(Some(settings)) => settings_issues(&settings),
        Err(StoreError::Corrupted { .. }) => vec!["Corrupted settings data".to_string()],
        Err(err) => {
            error!(error = %err, "Could not read settings for validation");
            internal_failures += 1;
            Vec::new()
        }
    };

    let history_issues = match storage.read_value(StorageKeys::DRAW_HISTORY) {
        Ok(None) => Vec::new(),
        Ok(Some(history)) => history_issues(&history),
        Err(StoreError::Corrupted { .. }) => vec!["Corrupted draw history data".to_string()],
        Err(err) => {
            error!(error = %err, "Could not read draw history for validation");
            internal_failures += 1;
            Vec::new()
        }
    };

    let settings = SectionReport::from_issues(settings_issues);
    let draw_history = SectionReport::from_issues(history_issues);
    let errors = settings.issues.len() + draw_history.issues.len() + internal_failures;
    let report = IntegrityReport {
        settings,
        draw_history,
        overall: OverallReport {
            valid: errors == 0,
            errors,
        },
    };

    if report.overall.valid {
        debug!("Data integrity check passed");
    } else {
        warn!(errors, "Data integrity check found problems");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FailingBackend;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn good_record(id: i64) -> Value {
        json!({"id": id, "timestamp": "2024-01-01T00:00:00.000Z", "winner": "Kim", "prize": "Gift"})
    }

    #[test]
    fn test_empty_store_is_valid() {
        let storage = Storage::new(MemoryBackend::new());
        let report = validate(&storage);
        assert!(report.overall.valid);
        assert_eq!(report.overall.errors, 0);
    }

    #[test]
    fn test_missing_winner_is_one_issue() {
        let storage = Storage::new(MemoryBackend::new());
        let mut broken = good_record(2);
        broken.as_object_mut().unwrap().remove("winner");
        storage.save(StorageKeys::DRAW_HISTORY, &json!([good_record(1), broken, good_record(3)]));

        let report = validate(&storage);
        assert!(report.settings.valid);
        assert!(!report.draw_history.valid);
        assert_eq!(report.draw_history.issues, vec!["Record 1: Missing winner"]);
        assert_eq!(report.overall.errors, 1);
        assert!(!report.overall.valid);
    }

    #[test]
    fn test_settings_checks() {
        let storage = Storage::new(MemoryBackend::new());
        storage.save(
            StorageKeys::SETTINGS,
            &json!({"prizes": {}, "participants": [], "appearance": "blue"}),
        );
        let report = validate(&storage);
        assert_eq!(
            report.settings.issues,
            vec![
                "Missing version information",
                "Invalid appearance settings",
                "Invalid prizes array"
            ]
        );
        assert_eq!(report.overall.errors, 3);
    }

    #[test]
    fn test_non_object_settings_fail_every_check() {
        let storage = Storage::new(MemoryBackend::new());
        storage.save(StorageKeys::SETTINGS, &json!("hello"));
        assert_eq!(validate(&storage).settings.issues.len(), 4);
    }

    #[test]
    fn test_corrupted_text_is_an_issue() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set(StorageKeys::SETTINGS, "{oops").unwrap();
        storage.backend().set(StorageKeys::DRAW_HISTORY, "[").unwrap();
        let report = validate(&storage);
        assert_eq!(report.settings.issues, vec!["Corrupted settings data"]);
        assert_eq!(report.draw_history.issues, vec!["Corrupted draw history data"]);
        assert_eq!(report.all_issues().len(), 2);
    }

    #[test]
    fn test_falsy_fields_count_as_missing() {
        let record = json!({"id": 0, "timestamp": "", "winner": null, "prize": "Gift"});
        assert_eq!(
            record_issues(4, &record),
            vec![
                "Record 4: Missing ID",
                "Record 4: Missing timestamp",
                "Record 4: Missing winner"
            ]
        );
        assert!(!record_is_intact(&json!(42)));
    }

    #[test]
    fn test_non_array_history() {
        let storage = Storage::new(MemoryBackend::new());
        storage.save(StorageKeys::DRAW_HISTORY, &json!({"drawHistory": []}));
        let report = validate(&storage);
        assert_eq!(report.draw_history.issues, vec!["Invalid draw history array"]);
    }

    #[test]
    fn test_unreadable_store_is_invalid() {
        let backend = FailingBackend::new().failing_reads(std::io::ErrorKind::Other);
        let storage = Storage::new(backend);
        let report = validate(&storage);
        assert!(report.settings.valid);
        assert!(report.draw_history.valid);
        assert_eq!(report.overall.errors, 2);
        assert!(!report.overall.valid);
    }

    #[test]
    fn test_validation_does_not_write() {
        let storage = Storage::new(MemoryBackend::new());
        storage.backend().set(StorageKeys::SETTINGS, "{oops").unwrap();
        validate(&storage);
        assert_eq!(
            storage.backend().get(StorageKeys::SETTINGS).unwrap().as_deref(),
            Some("{oops")
        );
    }
}
