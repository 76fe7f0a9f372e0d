//! Filesystem-backed store contents
//!
//! Each store is a directory; each entry is a JSON file named after the
//! SHA-256 of its request identity. Entries are written to a temporary file
//! and renamed into place so concurrent readers never see a torn entry.

use super::stats::StoreUsage;
use crate::http::{RequestIdentity, Response};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const ENTRY_EXTENSION: &str = "json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A stored request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub request: RequestIdentity,
    pub response: Response,
    /// When the entry was written (Unix timestamp, seconds)
    pub stored_at: u64,
}

impl CacheEntry {
    pub fn new(request: RequestIdentity, response: Response) -> Self {
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            request,
            response,
            stored_at,
        }
    }
}

/// Handle to one physical store directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    name: String,
    dir: PathBuf,
}

impl CacheStore {
    /// Open a store directory, creating it if needed
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        let dir = root.join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory: {:?}", dir))?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_path(&self, identity: &RequestIdentity) -> PathBuf {
        let digest = Sha256::digest(identity.to_string().as_bytes());
        self.dir.join(format!("{:x}.{}", digest, ENTRY_EXTENSION))
    }

    /// Load the entry stored for a request identity
    pub fn load(&self, identity: &RequestIdentity) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(identity);

        if !path.exists() {
            return Ok(None);
        }

        let file =
            File::open(&path).with_context(|| format!("Failed to open entry: {:?}", path))?;
        let entry: CacheEntry = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse entry: {:?}", path))?;

        // A digest collision must read as a miss
        if entry.request != *identity {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Store an entry, replacing any previous one for the same identity
    pub fn save(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.request);
        let tmp = path.with_extension(format!(
            "tmp{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write = || -> Result<()> {
            let file = File::create(&tmp)
                .with_context(|| format!("Failed to create entry: {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, entry)
                .with_context(|| format!("Failed to write entry: {:?}", tmp))?;
            writer
                .flush()
                .with_context(|| format!("Failed to flush entry: {:?}", tmp))?;
            fs::rename(&tmp, &path)
                .with_context(|| format!("Failed to move entry into place: {:?}", path))?;
            Ok(())
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        debug!(store = %self.name, request = %entry.request, "Saved entry");
        Ok(())
    }

    /// Remove the entry for a request identity; returns whether one existed
    pub fn delete(&self, identity: &RequestIdentity) -> Result<bool> {
        let path = self.entry_path(identity);

        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path).with_context(|| format!("Failed to remove entry: {:?}", path))?;
        debug!(store = %self.name, request = %identity, "Deleted entry");
        Ok(true)
    }

    /// Entry count and on-disk size
    pub fn usage(&self) -> Result<StoreUsage> {
        let mut usage = StoreUsage::default();

        for path in self.entry_files()? {
            usage.entries += 1;
            usage.size += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        }

        Ok(usage)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store directory: {:?}", self.dir))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}
