//! Named, versioned response stores
//!
//! The [`StoreManager`] owns every store the worker uses. Stores are named
//! `<prefix>-<name>-v<generation>`; only the three stores of the running
//! generation are valid, everything else is removed when a new version
//! activates.

mod stats;
mod storage;

pub use stats::{StoreStats, StoreUsage};
pub use storage::{CacheEntry, CacheStore};

use crate::error::{Result, WorkerError};
use crate::http::{Request, RequestIdentity, Response};
use crate::network::Network;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// The fixed set of store names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreName {
    Static,
    Images,
    Api,
}

impl StoreName {
    pub const ALL: [StoreName; 3] = [StoreName::Static, StoreName::Images, StoreName::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Static => "static",
            StoreName::Images => "images",
            StoreName::Api => "api",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation of a named store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub name: StoreName,
    pub generation: u32,
}

impl StoreDescriptor {
    /// Physical store name, e.g. `ceylon-gems-images-v3`
    pub fn cache_name(&self, prefix: &str) -> String {
        format!("{}-{}-v{}", prefix, self.name, self.generation)
    }
}

/// Owns the stores of one worker version
#[derive(Debug)]
pub struct StoreManager {
    root: PathBuf,
    prefix: String,
    generation: u32,
    counters: RwLock<StoreStats>,
}

impl StoreManager {
    /// Create a manager rooted at `root`; the directory is created on demand
    pub fn new(root: impl Into<PathBuf>, prefix: &str, generation: u32) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create stores directory: {:?}", root))?;

        Ok(Self {
            root,
            prefix: prefix.to_string(),
            generation,
            counters: RwLock::new(StoreStats::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn descriptor(&self, name: StoreName) -> StoreDescriptor {
        StoreDescriptor {
            name,
            generation: self.generation,
        }
    }

    /// Physical name of the current generation of `name`
    pub fn cache_name(&self, name: StoreName) -> String {
        self.descriptor(name).cache_name(&self.prefix)
    }

    /// Physical names of every store of the running generation
    pub fn valid_names(&self) -> BTreeSet<String> {
        StoreName::ALL
            .iter()
            .map(|name| self.cache_name(*name))
            .collect()
    }

    /// Open the current generation of a named store
    pub async fn open(&self, name: StoreName) -> Result<CacheStore> {
        self.open_named(&self.cache_name(name)).await
    }

    /// Open (or create) a store by physical name
    pub async fn open_named(&self, cache_name: &str) -> Result<CacheStore> {
        let root = self.root.clone();
        let cache_name = cache_name.to_string();
        Ok(blocking(move || CacheStore::open(&root, &cache_name)).await?)
    }

    /// Physical names of every store that exists on disk, any generation
    pub async fn store_names(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        let names = blocking(move || {
            let mut names = Vec::new();
            for entry in fs::read_dir(&root)
                .with_context(|| format!("Failed to read stores directory: {:?}", root))?
            {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            Ok(names)
        })
        .await?;
        Ok(names)
    }

    /// Delete a store by physical name; returns whether it existed
    pub async fn delete_store(&self, cache_name: &str) -> Result<bool> {
        let dir = self.root.join(cache_name);
        let deleted = blocking(move || {
            if !dir.exists() {
                return Ok(false);
            }
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to delete store: {:?}", dir))?;
            Ok(true)
        })
        .await?;
        Ok(deleted)
    }

    /// Delete every store whose name is not in `valid`.
    ///
    /// Idempotent. A store that cannot be deleted is logged and left in place;
    /// the remaining stores are still processed. Returns the deleted names.
    pub async fn evict_stale(&self, valid: &BTreeSet<String>) -> Vec<String> {
        let names = match self.store_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate stores, skipping eviction");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names.into_iter().filter(|name| !valid.contains(name)) {
            match self.delete_store(&name).await {
                Ok(true) => {
                    info!(store = %name, "Deleted stale store");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => error!(store = %name, error = %e, "Failed to delete stale store"),
            }
        }

        deleted
    }

    /// Fetch every manifest URL and store it in the static store.
    ///
    /// All or nothing: if any fetch fails or yields a response that cannot be
    /// stored, nothing from the manifest is written and install fails.
    pub async fn prepopulate(&self, network: &dyn Network, manifest: &[Url]) -> Result<()> {
        let fetches = manifest.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = network.fetch(&request).await.map_err(|e| {
                WorkerError::InstallFailed(format!("failed to fetch {}: {}", url, e))
            })?;
            if !response.is_cacheable() {
                return Err(WorkerError::InstallFailed(format!(
                    "{} returned status {} ({:?})",
                    url, response.status, response.kind
                )));
            }
            Ok::<_, WorkerError>(CacheEntry::new(request.identity(), response))
        });
        let entries = futures::future::try_join_all(fetches).await?;
        let store = self.open(StoreName::Static).await?;

        let count = entries.len();
        blocking(move || {
            let mut written: Vec<&RequestIdentity> = Vec::with_capacity(entries.len());
            for entry in &entries {
                if let Err(e) = store.save(entry) {
                    for identity in written {
                        if let Err(rollback) = store.delete(identity) {
                            warn!(
                                store = %store.name(),
                                request = %identity,
                                error = %rollback,
                                "Failed to roll back manifest entry"
                            );
                        }
                    }
                    return Err(e.context("Failed to store manifest entry"));
                }
                written.push(&entry.request);
            }
            Ok(())
        })
        .await
        .map_err(|e| WorkerError::InstallFailed(format!("{:#}", e)))?;

        info!(count, store = %self.cache_name(StoreName::Static), "Precached manifest");
        Ok(())
    }

    /// Look up a stored response. Any storage failure reads as a miss.
    pub async fn read(&self, name: StoreName, identity: &RequestIdentity) -> Option<CacheEntry> {
        let root = self.root.clone();
        let cache_name = self.cache_name(name);
        let key = identity.clone();

        let result = blocking(move || {
            let dir = root.join(&cache_name);
            if !dir.exists() {
                return Ok(None);
            }
            CacheStore::open(&root, &cache_name)?.load(&key)
        })
        .await;

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(store = %name, request = %identity, error = %e, "Store read failed, treating as miss");
                None
            }
        };

        self.record(entry.is_some());
        entry
    }

    /// Store a response. Non-cacheable responses and storage failures are
    /// skipped silently; returns whether the entry was written.
    pub async fn write(&self, name: StoreName, identity: &RequestIdentity, response: &Response) -> bool {
        if !response.is_cacheable() {
            debug!(store = %name, request = %identity, status = response.status, "Skipping non-cacheable response");
            return false;
        }

        let root = self.root.clone();
        let cache_name = self.cache_name(name);
        let entry = CacheEntry::new(identity.clone(), response.clone());

        match blocking(move || CacheStore::open(&root, &cache_name)?.save(&entry)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(store = %name, request = %identity, error = %e, "Store write failed, skipping");
                false
            }
        }
    }

    /// Usage of every store on disk plus hit/miss counters since startup
    pub async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::new();
        let valid = self.valid_names();

        for name in self.store_names().await? {
            let root = self.root.clone();
            let store_name = name.clone();
            let mut usage = blocking(move || CacheStore::open(&root, &store_name)?.usage()).await?;
            usage.current = valid.contains(&name);
            stats.record(name, usage);
        }

        if let Ok(counters) = self.counters.read() {
            stats.hits = counters.hits;
            stats.misses = counters.misses;
            stats.calculate_hit_rate();
        }

        Ok(stats)
    }

    fn record(&self, hit: bool) {
        if let Ok(mut counters) = self.counters.write() {
            if hit {
                counters.hits += 1;
            } else {
                counters.misses += 1;
            }
        }
    }
}

/// Run blocking filesystem work off the async executor
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Store task panicked")?
}
