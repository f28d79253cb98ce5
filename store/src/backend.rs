use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default capacity ceiling in bytes.
pub const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

/// Errors raised by a raw key/value backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("quota exceeded: {needed} bytes needed, capacity is {capacity}")]
    QuotaExceeded { needed: u64, capacity: u64 },
    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),
    #[error("invalid key {0:?}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            BackendError::PermissionDenied(err)
        } else {
            BackendError::Io(err)
        }
    }
}

/// Synchronous, origin-scoped string key/value storage.
///
/// All methods take `&self`; implementations own whatever interior
/// mutability they need.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;
    fn remove(&self, key: &str) -> Result<(), BackendError>;
    fn clear(&self) -> Result<(), BackendError>;
    fn keys(&self) -> Result<Vec<String>, BackendError>;
    /// Capacity ceiling in bytes of key plus value text.
    fn capacity(&self) -> u64;
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

/// In-process backend, mostly for tests and ephemeral sessions.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
    capacity: u64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY_BYTES)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut entries = self.lock();
        let others: u64 = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| entry_size(k, v))
            .sum();
        let needed = others + entry_size(key, value);
        if needed > self.capacity {
            return Err(BackendError::QuotaExceeded {
                needed,
                capacity: self.capacity,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        self.lock().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// Suffix of the files a `FileBackend` owns. Other files in its directory
/// are never listed, counted, or removed.
const FILE_SUFFIX: &str = ".kv.json";

/// File-per-key backend. Each key is stored as `<key>.kv.json` in one directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    capacity: u64,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self::with_capacity(dir, DEFAULT_CAPACITY_BYTES)
    }

    pub fn with_capacity(dir: PathBuf, capacity: u64) -> Self {
        Self { dir, capacity }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), BackendError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn file_path(&self, key: &str) -> Result<PathBuf, BackendError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(BackendError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}{}", key, FILE_SUFFIX)))
    }

    fn used_excluding(&self, excluded: &str) -> Result<u64, BackendError> {
        let mut used = 0;
        for key in self.keys()? {
            if key == excluded {
                continue;
            }
            if let Some(value) = self.get(&key)? {
                used += entry_size(&key, &value);
            }
        }
        Ok(used)
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let path = self.file_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let path = self.file_path(key)?;
        self.ensure_dir()?;
        let needed = self.used_excluding(key)? + entry_size(key, value);
        if needed > self.capacity {
            return Err(BackendError::QuotaExceeded {
                needed,
                capacity: self.capacity,
            });
        }
        std::fs::write(&path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let path = self.file_path(key)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let key = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(FILE_SUFFIX));
            if let Some(key) = key.filter(|k| !k.is_empty()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_set_get_remove() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").unwrap();
        assert_eq!(backend.get("a").unwrap(), Some("1".to_string()));
        backend.remove("a").unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_quota_counts_key_and_value() {
        let backend = MemoryBackend::with_capacity(10);
        backend.set("key", "1234567").unwrap();
        let err = backend.set("other", "x").unwrap_err();
        assert!(matches!(err, BackendError::QuotaExceeded { needed: 16, capacity: 10 }));
        // overwriting the same key does not count its old value
        backend.set("key", "7654321").unwrap();
    }

    #[test]
    fn test_file_roundtrip_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("store"));
        assert!(backend.keys().unwrap().is_empty());

        backend.set("beta", "{}").unwrap();
        backend.set("alpha", "[1,2]").unwrap();
        assert_eq!(backend.get("alpha").unwrap(), Some("[1,2]".to_string()));
        assert_eq!(backend.keys().unwrap(), vec!["alpha", "beta"]);

        backend.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hi").unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.set("settings", "{}").unwrap();
        assert!(dir.path().join("settings.kv.json").exists());
        assert_eq!(backend.keys().unwrap(), vec!["settings"]);

        backend.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
        assert!(dir.path().join("notes.json").exists());
        assert!(dir.path().join("readme.txt").exists());
    }

    #[test]
    fn test_file_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert_eq!(backend.get("missing").unwrap(), None);
        backend.remove("missing").unwrap();
    }

    #[test]
    fn test_file_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(matches!(
            backend.set("../escape", "x"),
            Err(BackendError::InvalidKey(_))
        ));
        assert!(matches!(backend.get(""), Err(BackendError::InvalidKey(_))));
    }

    #[test]
    fn test_file_quota() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::with_capacity(dir.path().to_path_buf(), 8);
        backend.set("k", "1234").unwrap();
        assert!(matches!(
            backend.set("k2", "12345"),
            Err(BackendError::QuotaExceeded { .. })
        ));
        assert_eq!(backend.get("k2").unwrap(), None);
    }

    #[test]
    fn test_permission_denied_is_classified() {
        let err: BackendError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, BackendError::PermissionDenied(_)));
        let err: BackendError = io::Error::other("boom").into();
        assert!(matches!(err, BackendError::Io(_)));
    }
}
