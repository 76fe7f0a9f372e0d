//! Local key/value storage shared by the UI-side caches
//!
//! [`LocalStorage`] is a flat string-to-string map with a byte quota, the
//! same shape a browser offers. Several independent users share it, each
//! under its own key namespace:
//!
//! - [`TtlCache`] owns every key starting with `cg_cache_`
//! - [`PreferenceStore`] owns `cg_user_preferences`

mod preferences;
mod storage;
mod ttl;

pub use preferences::{
    Filters, PreferenceStore, Preferences, SortOrder, Theme, ViewMode, PREFERENCES_KEY,
    RECENTLY_VIEWED_LIMIT,
};
pub use storage::{FileStorage, MemoryStorage};
pub use ttl::{TtlCache, TtlEntry, CACHE_PREFIX, DEFAULT_TTL_MINUTES};

use thiserror::Error;

/// Default quota, matching what browsers grant an origin
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent string map, synchronous like the browser API it stands in for
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Every key currently stored, in no particular order
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}
