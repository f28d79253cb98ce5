use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backend::KeyValueBackend;
use crate::notify::{NotificationSink, Severity, TracingSink};
use crate::StoreError;

/// Fixed keys under which the application persists its payloads.
pub struct StorageKeys;

impl StorageKeys {
    pub const SETTINGS: &'static str = "rolling_lottery_settings";
    pub const DRAW_HISTORY: &'static str = "rolling_lottery_history";
    pub const APP_VERSION: &'static str = "rolling_lottery_version";
}

const PROBE_KEY: &str = "__probe__";

/// Estimated storage consumption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageUsage {
    pub used: u64,
    pub available: u64,
    pub percentage: f64,
}

impl StorageUsage {
    const EMPTY: StorageUsage = StorageUsage {
        used: 0,
        available: 0,
        percentage: 0.0,
    };
}

/// JSON store adapter over a raw key/value backend.
///
/// Every failure is logged and forwarded to the notification sink. The
/// boolean and defaulting entry points never surface an error to the caller.
pub struct Storage<B> {
    backend: B,
    sink: Arc<dyn NotificationSink>,
}

impl<B: KeyValueBackend> Storage<B> {
    pub fn new(backend: B) -> Self {
        Self::with_sink(backend, Arc::new(TracingSink))
    }

    pub fn with_sink(backend: B, sink: Arc<dyn NotificationSink>) -> Self {
        Self { backend, sink }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn notify(&self, message: &str, severity: Severity) {
        self.sink.notify(message, severity);
    }

    /// Serialize and write `data` under `key`.
    pub fn try_save<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> Result<(), StoreError> {
        debug!(key, "Attempting to save data");

        let serialized = serde_json::to_string(data).map_err(|source| {
            error!(key, %source, "Failed to serialize data");
            self.notify(
                "Something went wrong while saving data. Please restart the application.",
                Severity::Error,
            );
            StoreError::Serialize {
                key: key.to_string(),
                source,
            }
        })?;

        if let Err(source) = self.backend.set(key, &serialized) {
            let err = StoreError::from_backend(key, source);
            error!(key, error = %err, "Failed to save data");
            match &err {
                StoreError::QuotaExceeded { .. } => {
                    warn!(key, "Storage quota exceeded");
                    self.notify(
                        "Storage space is full. Remove data you no longer need from data management.",
                        Severity::Warning,
                    );
                }
                StoreError::PermissionDenied { .. } => {
                    self.notify(
                        "Data cannot be saved because of storage security settings.",
                        Severity::Error,
                    );
                }
                _ => {
                    self.notify(
                        "Something went wrong while saving data. Please restart the application.",
                        Severity::Error,
                    );
                }
            }
            return Err(err);
        }

        info!(key, size = serialized.len(), "Data saved successfully");
        Ok(())
    }

    /// Serialize and write `data` under `key`, reporting only success.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> bool {
        self.try_save(key, data).is_ok()
    }

    /// Raw read without notifications. Absent keys are `Ok(None)`.
    pub fn read_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let Some(text) = self
            .backend
            .get(key)
            .map_err(|source| StoreError::from_backend(key, source))?
        else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Corrupted {
                key: key.to_string(),
                source,
            })
    }

    /// Load the value under `key`, or `None` when absent or unreadable.
    pub fn load_value(&self, key: &str) -> Option<Value> {
        debug!(key, "Attempting to load data");
        match self.read_value(key) {
            Ok(None) => {
                debug!(key, "No data found for key");
                None
            }
            Ok(Some(value)) => {
                info!(key, "Data loaded successfully");
                Some(value)
            }
            Err(err) => {
                self.report_read_failure(key, &err);
                None
            }
        }
    }

    /// Load and decode the value under `key`, falling back to `default`.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = self.load_value(key) else {
            return default;
        };
        match serde_json::from_value(value) {
            Ok(data) => data,
            Err(source) => {
                let err = StoreError::Corrupted {
                    key: key.to_string(),
                    source,
                };
                self.report_read_failure(key, &err);
                default
            }
        }
    }

    fn report_read_failure(&self, key: &str, err: &StoreError) {
        error!(key, error = %err, "Failed to load data");
        if let StoreError::Corrupted { .. } = err {
            warn!(key, "Corrupted data detected");
            self.notify(
                &format!("Stored data is corrupted ({}). Using defaults.", key),
                Severity::Warning,
            );
        } else {
            self.notify(
                "Something went wrong while loading saved data.",
                Severity::Error,
            );
        }
    }

    /// Remove a single key.
    pub fn clear(&self, key: &str) -> bool {
        debug!(key, "Attempting to clear data");
        match self.backend.remove(key) {
            Ok(()) => {
                info!(key, "Data cleared successfully");
                true
            }
            Err(err) => {
                error!(key, error = %err, "Failed to clear key");
                self.notify("Something went wrong while deleting data.", Severity::Error);
                false
            }
        }
    }

    /// Remove every key in the store.
    pub fn clear_all(&self) -> bool {
        warn!("Attempting to clear all stored data");
        match self.backend.clear() {
            Ok(()) => {
                info!("All stored data cleared successfully");
                true
            }
            Err(err) => {
                error!(error = %err, "Failed to clear all stored data");
                self.notify(
                    "Something went wrong while deleting all data.",
                    Severity::Error,
                );
                false
            }
        }
    }

    pub fn has_key(&self, key: &str) -> bool {
        match self.backend.get(key) {
            Ok(value) => value.is_some(),
            Err(err) => {
                error!(key, error = %err, "Failed to check key");
                false
            }
        }
    }

    /// Probe the backend with a scratch write, read, and remove.
    ///
    /// A full store still counts as available.
    pub fn is_available(&self) -> bool {
        let probe = || -> Result<bool, crate::BackendError> {
            self.backend.set(PROBE_KEY, "probe")?;
            let read = self.backend.get(PROBE_KEY)?;
            self.backend.remove(PROBE_KEY)?;
            Ok(read.as_deref() == Some("probe"))
        };
        match probe() {
            Ok(available) => available,
            Err(err @ crate::BackendError::QuotaExceeded { .. }) => {
                warn!(error = %err, "Storage is full");
                true
            }
            Err(err) => {
                warn!(error = %err, "Storage is not available");
                self.notify(
                    "Local storage is unavailable. Settings may not be saved.",
                    Severity::Warning,
                );
                false
            }
        }
    }

    /// Estimate usage against the backend's capacity ceiling.
    pub fn usage(&self) -> StorageUsage {
        if !self.is_available() {
            return StorageUsage::EMPTY;
        }

        let used = || -> Result<u64, crate::BackendError> {
            let mut used = 0u64;
            for key in self.backend.keys()? {
                if let Some(value) = self.backend.get(&key)? {
                    used += (key.len() + value.len()) as u64;
                }
            }
            Ok(used)
        };

        match used() {
            Ok(used) => {
                let capacity = self.backend.capacity();
                let percentage = if capacity == 0 {
                    0.0
                } else {
                    (used as f64 / capacity as f64 * 100.0 * 100.0).round() / 100.0
                };
                let usage = StorageUsage {
                    used,
                    available: capacity.saturating_sub(used),
                    percentage,
                };
                debug!(used, available = usage.available, percentage, "Storage usage calculated");
                usage
            }
            Err(err) => {
                error!(error = %err, "Failed to calculate storage usage");
                StorageUsage::EMPTY
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FailingBackend;
    use crate::backend::MemoryBackend;
    use crate::notify::NotificationLog;
    use serde_json::json;
    use std::io;

    fn storage_with_log(backend: MemoryBackend) -> (Storage<MemoryBackend>, Arc<NotificationLog>) {
        let log = Arc::new(NotificationLog::new());
        (Storage::with_sink(backend, log.clone()), log)
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (storage, log) = storage_with_log(MemoryBackend::new());
        let data = json!({"prizes": [{"id": 1, "name": "Gift"}], "version": "1.2.0"});
        assert!(storage.save("k", &data));
        assert_eq!(storage.load("k", Value::Null), data);
        assert!(log.is_empty());
    }

    #[test]
    fn test_load_missing_returns_default() {
        let (storage, log) = storage_with_log(MemoryBackend::new());
        let loaded: Vec<i32> = storage.load("missing", vec![7]);
        assert_eq!(loaded, vec![7]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_load_corrupted_returns_default_and_warns() {
        let (storage, log) = storage_with_log(MemoryBackend::new());
        storage.backend().set("k", "{not json").unwrap();

        let loaded: Vec<i32> = storage.load("k", vec![]);
        assert!(loaded.is_empty());

        let notes = log.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Warning);
        assert!(notes[0].message.contains("corrupted (k)"));
    }

    #[test]
    fn test_read_value_reports_corruption() {
        let (storage, log) = storage_with_log(MemoryBackend::new());
        storage.backend().set("k", "nope").unwrap();
        assert!(matches!(
            storage.read_value("k"),
            Err(StoreError::Corrupted { .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_save_quota_exceeded_warns() {
        let (storage, log) = storage_with_log(MemoryBackend::with_capacity(16));
        assert!(!storage.save("k", &"this value is far too long"));
        assert!(matches!(
            storage.try_save("k", &"this value is far too long"),
            Err(StoreError::QuotaExceeded { .. })
        ));

        let notes = log.drain();
        assert_eq!(notes[0].severity, Severity::Warning);
        assert!(notes[0].message.contains("Storage space is full"));
    }

    #[test]
    fn test_save_permission_denied_is_an_error() {
        let log = Arc::new(NotificationLog::new());
        let backend = FailingBackend::new().failing_writes(io::ErrorKind::PermissionDenied);
        let storage = Storage::with_sink(backend, log.clone());

        assert!(matches!(
            storage.try_save("k", &1),
            Err(StoreError::PermissionDenied { .. })
        ));
        let notes = log.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(notes[0].message.contains("storage security settings"));
    }

    #[test]
    fn test_load_read_failure_returns_default() {
        let log = Arc::new(NotificationLog::new());
        let backend = FailingBackend::new().failing_reads(io::ErrorKind::Other);
        backend.inner().set("k", "[1]").unwrap();
        let storage = Storage::with_sink(backend, log.clone());

        let loaded: Vec<i32> = storage.load("k", vec![9]);
        assert_eq!(loaded, vec![9]);
        let notes = log.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(notes[0].message.contains("while loading"));
    }

    #[test]
    fn test_usage_empty_store() {
        let storage = Storage::new(MemoryBackend::new());
        let usage = storage.usage();
        assert_eq!(usage.used, 0);
        assert_eq!(usage.percentage, 0.0);
        assert_eq!(usage.available, crate::DEFAULT_CAPACITY_BYTES);
    }

    #[test]
    fn test_usage_counts_keys_and_values() {
        let storage = Storage::new(MemoryBackend::with_capacity(1000));
        assert!(storage.save("ab", &"xyz"));
        // key "ab" (2) + serialized "\"xyz\"" (5)
        let usage = storage.usage();
        assert_eq!(usage.used, 7);
        assert_eq!(usage.available, 993);
        assert_eq!(usage.percentage, 0.7);
    }

    #[test]
    fn test_usage_on_nearly_full_store() {
        let (storage, log) = storage_with_log(MemoryBackend::with_capacity(100));
        // key (1) + 90 bytes of value text
        storage.backend().set("k", &"x".repeat(90)).unwrap();
        assert!(storage.is_available());

        let usage = storage.usage();
        assert_eq!(usage.used, 91);
        assert_eq!(usage.available, 9);
        assert_eq!(usage.percentage, 91.0);
        assert!(log.is_empty());
        assert_eq!(storage.backend().keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_clear_and_clear_all() {
        let storage = Storage::new(MemoryBackend::new());
        storage.save("a", &1);
        storage.save("b", &2);
        assert!(storage.clear("a"));
        assert!(!storage.has_key("a"));
        assert!(storage.has_key("b"));
        assert!(storage.clear_all());
        assert!(!storage.has_key("b"));
    }

    #[test]
    fn test_probe_leaves_no_trace() {
        let storage = Storage::new(MemoryBackend::new());
        assert!(storage.is_available());
        assert!(storage.backend().keys().unwrap().is_empty());
    }
}
