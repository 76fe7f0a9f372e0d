//! Local storage backends

use super::{LocalStorage, StorageError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::debug;

type Items = BTreeMap<String, String>;

fn usage(items: &Items) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Bytes the map would use after `key` is set to `value`
fn usage_after(items: &Items, key: &str, value: &str) -> usize {
    let current = usage(items);
    let replaced = items.get(key).map(|old| key.len() + old.len()).unwrap_or(0);
    current - replaced + key.len() + value.len()
}

fn check_quota(items: &Items, key: &str, value: &str, quota: Option<usize>) -> Result<(), StorageError> {
    if let Some(quota) = quota {
        let needed = usage_after(items, key, value);
        if needed > quota {
            return Err(StorageError::QuotaExceeded { needed, quota });
        }
    }
    Ok(())
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<Items>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: RwLock::new(Items::new()),
            quota: Some(quota),
        }
    }

    fn poisoned() -> StorageError {
        StorageError::Unavailable("storage lock poisoned".to_string())
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        check_quota(&items, key, value, self.quota)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.write().map_err(|_| Self::poisoned())?;
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let items = self.items.read().map_err(|_| Self::poisoned())?;
        Ok(items.keys().cloned().collect())
    }
}

/// Storage persisted as a single JSON document
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    quota: Option<usize>,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
            lock: Mutex::new(()),
        }
    }

    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Items, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Items::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Items::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, items: &Items) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(items)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, keys = items.len(), "Saved local storage");
        Ok(())
    }

    /// Run a read-modify-write cycle under the file lock
    fn modify<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Items) -> Result<bool, StorageError>,
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))?;
        let mut items = self.load()?;
        if f(&mut items)? {
            self.save(&items)?;
        }
        Ok(())
    }
}

impl LocalStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let quota = self.quota;
        self.modify(|items| {
            check_quota(items, key, value, quota)?;
            items.insert(key.to_string(), value.to_string());
            Ok(true)
        })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|items| Ok(items.remove(key).is_some()))
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_storage_basic() {
        let storage = MemoryStorage::new();
        assert!(storage.get_item("a").unwrap().is_none());

        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);

        storage.remove_item("a").unwrap();
        storage.remove_item("missing").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_quota_counts_replacement() {
        let storage = MemoryStorage::with_quota(10);
        storage.set_item("key", "1234567").unwrap();
        // Replacing the value frees the old bytes first
        storage.set_item("key", "7654321").unwrap();

        let err = storage.set_item("key2", "x").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 15, quota: 10 }));
        assert_eq!(storage.get_item("key").unwrap().as_deref(), Some("7654321"));
    }

    #[test]
    fn test_file_storage_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("local_storage.json");

        let storage = FileStorage::new(&path);
        storage.set_item("cg_user_preferences", "{}").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(
            reopened.get_item("cg_user_preferences").unwrap().as_deref(),
            Some("{}")
        );
        reopened.remove_item("cg_user_preferences").unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_storage_quota() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::new(temp.path().join("ls.json")).with_quota(8);

        storage.set_item("k", "v").unwrap();
        assert!(matches!(
            storage.set_item("big", "0123456789"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(storage.keys().unwrap(), vec!["k"]);
    }

    #[test]
    fn test_file_storage_corrupt_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ls.json");
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(storage.get_item("a"), Err(StorageError::Corrupt(_))));
        assert!(storage.set_item("a", "b").is_err());
    }
}
