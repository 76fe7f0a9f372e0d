//! Persisted user preferences
//!
//! Stored as one JSON document under `cg_user_preferences`, next to (but
//! never inside) the TTL cache namespace.

use super::LocalStorage;
use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

pub const PREFERENCES_KEY: &str = "cg_user_preferences";
pub const RECENTLY_VIEWED_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceHigh,
    PriceLow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub sort: SortOrder,
    pub price_range: [u64; 2],
    pub gem_types: Vec<String>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            sort: SortOrder::Newest,
            price_range: [0, 10_000],
            gem_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub theme: Theme,
    pub view_mode: ViewMode,
    pub currency: String,
    pub recently_viewed: Vec<String>,
    pub filters: Filters,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            view_mode: ViewMode::Grid,
            currency: "USD".to_string(),
            recently_viewed: Vec::new(),
            filters: Filters::default(),
        }
    }
}

/// In-memory preferences kept in sync with local storage
pub struct PreferenceStore {
    storage: Arc<dyn LocalStorage>,
    current: Preferences,
}

impl PreferenceStore {
    /// Load stored preferences, falling back to defaults when absent or unreadable
    pub fn load(storage: Arc<dyn LocalStorage>) -> Self {
        let current = match storage.get_item(PREFERENCES_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                error!(error = %e, "Error loading user preferences");
                Preferences::default()
            }),
            Ok(None) => Preferences::default(),
            Err(e) => {
                error!(error = %e, "Error loading user preferences");
                Preferences::default()
            }
        };

        Self { storage, current }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.current
    }

    /// Replace a single top-level preference
    pub fn update(&mut self, key: &str, value: Value) -> Result<()> {
        let mut doc = serde_json::to_value(&self.current)?;
        let fields = doc
            .as_object_mut()
            .ok_or_else(|| WorkerError::Storage("preferences are not an object".to_string()))?;

        if !fields.contains_key(key) {
            return Err(WorkerError::InvalidRequest(format!(
                "Unknown preference: {}",
                key
            )));
        }
        fields.insert(key.to_string(), value);

        self.current = serde_json::from_value(doc).map_err(|e| {
            WorkerError::InvalidRequest(format!("Invalid value for {}: {}", key, e))
        })?;
        self.persist();
        Ok(())
    }

    /// Merge `updates` into the filter settings, keeping unspecified fields
    pub fn update_filters(&mut self, updates: Value) -> Result<()> {
        let updates = match updates {
            Value::Object(map) => map,
            _ => {
                return Err(WorkerError::InvalidRequest(
                    "Filter updates must be an object".to_string(),
                ))
            }
        };

        let mut filters = serde_json::to_value(&self.current.filters)?;
        if let Some(fields) = filters.as_object_mut() {
            for (key, value) in updates {
                fields.insert(key, value);
            }
        }

        self.current.filters = serde_json::from_value(filters)
            .map_err(|e| WorkerError::InvalidRequest(format!("Invalid filters: {}", e)))?;
        self.persist();
        Ok(())
    }

    /// Move `gem_id` to the front of the recently viewed list
    pub fn add_to_recently_viewed(&mut self, gem_id: &str) {
        if gem_id.is_empty() {
            return;
        }

        let recent = &mut self.current.recently_viewed;
        recent.retain(|id| id != gem_id);
        recent.insert(0, gem_id.to_string());
        recent.truncate(RECENTLY_VIEWED_LIMIT);
        self.persist();
    }

    /// Drop stored preferences and start over from defaults
    pub fn reset(&mut self) {
        if let Err(e) = self.storage.remove_item(PREFERENCES_KEY) {
            error!(error = %e, "Error clearing user preferences");
        }
        self.current = Preferences::default();
        self.persist();
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.current)
            .map_err(super::StorageError::from)
            .and_then(|json| self.storage.set_item(PREFERENCES_KEY, &json));

        if let Err(e) = result {
            warn!(error = %e, "Error saving user preferences");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStorage;
    use serde_json::json;

    fn store() -> (PreferenceStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (PreferenceStore::load(storage.clone()), storage)
    }

    #[test]
    fn test_defaults() {
        let (prefs, _storage) = store();
        let p = prefs.preferences();
        assert_eq!(p.theme, Theme::Light);
        assert_eq!(p.view_mode, ViewMode::Grid);
        assert_eq!(p.currency, "USD");
        assert_eq!(p.filters.price_range, [0, 10_000]);
    }

    #[test]
    fn test_stored_json_uses_camel_case() {
        let (mut prefs, storage) = store();
        prefs.update("viewMode", json!("list")).unwrap();

        let raw: Value =
            serde_json::from_str(&storage.get_item(PREFERENCES_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["viewMode"], "list");
        assert_eq!(raw["filters"]["priceRange"], json!([0, 10000]));
        assert_eq!(raw["recentlyViewed"], json!([]));
    }

    #[test]
    fn test_update_rejects_unknown_and_invalid() {
        let (mut prefs, _storage) = store();
        assert!(prefs.update("font", json!("serif")).is_err());
        assert!(prefs.update("theme", json!("sepia")).is_err());
        assert_eq!(prefs.preferences().theme, Theme::Light);

        prefs.update("currency", json!("LKR")).unwrap();
        assert_eq!(prefs.preferences().currency, "LKR");
    }

    #[test]
    fn test_recently_viewed_moves_to_front_and_caps() {
        let (mut prefs, _storage) = store();
        for i in 0..12 {
            prefs.add_to_recently_viewed(&format!("gem-{}", i));
        }
        prefs.add_to_recently_viewed("gem-5");
        prefs.add_to_recently_viewed("");

        let recent = &prefs.preferences().recently_viewed;
        assert_eq!(recent.len(), RECENTLY_VIEWED_LIMIT);
        assert_eq!(recent[0], "gem-5");
        assert_eq!(recent[1], "gem-11");
        assert_eq!(recent.iter().filter(|id| *id == "gem-5").count(), 1);
        assert!(!recent.contains(&"gem-0".to_string()));
    }

    #[test]
    fn test_update_filters_merges() {
        let (mut prefs, _storage) = store();
        prefs
            .update_filters(json!({"sort": "price-low", "gemTypes": ["sapphire"]}))
            .unwrap();

        let filters = &prefs.preferences().filters;
        assert_eq!(filters.sort, SortOrder::PriceLow);
        assert_eq!(filters.gem_types, vec!["sapphire"]);
        assert_eq!(filters.price_range, [0, 10_000]);

        assert!(prefs.update_filters(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_reload_and_reset() {
        let (mut prefs, storage) = store();
        prefs.update("theme", json!("dark")).unwrap();

        let mut reloaded = PreferenceStore::load(storage.clone());
        assert_eq!(reloaded.preferences().theme, Theme::Dark);

        reloaded.reset();
        assert_eq!(reloaded.preferences(), &Preferences::default());
        assert_eq!(PreferenceStore::load(storage).preferences().theme, Theme::Light);
    }

    #[test]
    fn test_corrupt_preferences_fall_back_to_defaults() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(PREFERENCES_KEY, "{\"theme\":").unwrap();
        let prefs = PreferenceStore::load(storage);
        assert_eq!(prefs.preferences(), &Preferences::default());
    }
}
