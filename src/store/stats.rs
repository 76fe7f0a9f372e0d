//! Store statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Usage and hit/miss figures across all stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total number of entries across all stores
    pub total_entries: usize,

    /// Total size of all entry files in bytes
    pub total_size: u64,

    /// Lookups answered from a store since startup
    pub hits: u64,

    /// Lookups that found nothing since startup
    pub misses: u64,

    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,

    /// Per-store usage keyed by physical store name
    pub by_store: BTreeMap<String, StoreUsage>,
}

impl StoreStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the hit rate from the counters
    pub fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };
    }

    pub fn record(&mut self, store: String, usage: StoreUsage) {
        self.total_entries += usage.entries;
        self.total_size += usage.size;
        self.by_store.insert(store, usage);
    }

    pub fn format_size(size: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;

        if size >= MB {
            format!("{:.2} MB", size as f64 / MB as f64)
        } else if size >= KB {
            format!("{:.2} KB", size as f64 / KB as f64)
        } else {
            format!("{} B", size)
        }
    }

    /// Human-readable summary, one store per line
    pub fn display(&self) -> String {
        let mut output = format!(
            "{} entries, {} ({} hits / {} misses, {:.1}% hit rate)\n",
            self.total_entries,
            Self::format_size(self.total_size),
            self.hits,
            self.misses,
            self.hit_rate * 100.0
        );

        for (name, usage) in &self.by_store {
            let marker = if usage.current { "" } else { " (stale)" };
            output.push_str(&format!(
                "  {}{}: {} entries, {}\n",
                name,
                marker,
                usage.entries,
                Self::format_size(usage.size)
            ));
        }

        output
    }
}

/// Usage of a single store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUsage {
    pub entries: usize,
    pub size: u64,
    /// Whether the store belongs to the running generation
    pub current: bool,
}
