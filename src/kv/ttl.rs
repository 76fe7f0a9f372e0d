//! Key/value cache with time-to-live
//!
//! Entries live in local storage as `cg_cache_<key>` → `{"data":…,"expiry":…}`
//! with `expiry` in epoch milliseconds. Expiry is checked lazily on read; an
//! expired entry is deleted the first time someone asks for it. No operation
//! here ever fails loudly: storage problems turn into `false` or `None`.

use super::LocalStorage;
use crate::clock::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

pub const CACHE_PREFIX: &str = "cg_cache_";
pub const DEFAULT_TTL_MINUTES: u64 = 60;

/// Stored form of a cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtlEntry {
    pub data: Value,
    pub expiry: i64,
}

impl TtlEntry {
    pub fn is_live(&self, now_millis: i64) -> bool {
        self.expiry > now_millis
    }
}

pub struct TtlCache {
    storage: Arc<dyn LocalStorage>,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn LocalStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }

    /// Store `data` for `ttl_minutes`. Returns false if it could not be stored.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl_minutes: u64) -> bool {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                error!(key, error = %e, "Cache set error");
                return false;
            }
        };

        let ttl_millis = i64::try_from(ttl_minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        let entry = TtlEntry {
            data,
            expiry: self.clock.now_millis().saturating_add(ttl_millis),
        };

        let result = serde_json::to_string(&entry)
            .map_err(super::StorageError::from)
            .and_then(|json| self.storage.set_item(&Self::storage_key(key), &json));

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "Cache set error");
                false
            }
        }
    }

    /// Store `data` for the default hour
    pub fn set_default<T: Serialize + ?Sized>(&self, key: &str, data: &T) -> bool {
        self.set(key, data, DEFAULT_TTL_MINUTES)
    }

    /// Fetch a live value. Expired entries are removed; anything unreadable
    /// is reported as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let storage_key = Self::storage_key(key);

        let raw = match self.storage.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!(key, error = %e, "Cache get error");
                return None;
            }
        };

        let entry: TtlEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                error!(key, error = %e, "Cache get error");
                return None;
            }
        };

        if !entry.is_live(self.clock.now_millis()) {
            debug!(key, expiry = entry.expiry, "Cache entry expired");
            if let Err(e) = self.storage.remove_item(&storage_key) {
                error!(key, error = %e, "Failed to remove expired entry");
            }
            return None;
        }

        Some(entry.data)
    }

    /// Fetch a live value and decode it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.storage.remove_item(&Self::storage_key(key)) {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "Cache remove error");
                false
            }
        }
    }

    /// Remove every key in this cache's namespace and nothing else
    pub fn clear(&self) -> bool {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Cache clear error");
                return false;
            }
        };

        let mut ok = true;
        for key in keys.iter().filter(|k| k.starts_with(CACHE_PREFIX)) {
            if let Err(e) = self.storage.remove_item(key) {
                error!(key = %key, error = %e, "Cache clear error");
                ok = false;
            }
        }
        ok
    }

    /// Keys (without prefix) currently in the namespace, live or not
    pub fn keys(&self) -> Vec<String> {
        match self.storage.keys() {
            Ok(keys) => {
                let mut keys: Vec<String> = keys
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(CACHE_PREFIX).map(str::to_string))
                    .collect();
                keys.sort();
                keys
            }
            Err(e) => {
                error!(error = %e, "Cache keys error");
                Vec::new()
            }
        }
    }
}
