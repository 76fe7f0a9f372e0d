//! Worker configuration

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

/// Default data directory relative to home directory
pub const DEFAULT_DATA_DIR: &str = ".ceylon-offline";

/// Config file inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_STORE_PREFIX: &str = "ceylon-gems";
pub const DEFAULT_VERSION: u32 = 1;

/// Paths stored during install
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/ceylongemshub",
    "/ceylongemshub/",
    "/assets/logo.svg",
];

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Site the worker serves; requests elsewhere are not intercepted
    pub origin: Url,

    /// Worker version, used as the store generation
    pub version: u32,

    /// Prefix of every store name
    pub store_prefix: String,

    /// Where stores, local storage and the registration live
    pub data_dir: PathBuf,

    /// Paths (relative to the origin) stored during install
    pub precache: Vec<String>,

    /// Local storage quota in bytes
    pub storage_quota: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            version: DEFAULT_VERSION,
            store_prefix: DEFAULT_STORE_PREFIX.to_string(),
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATA_DIR),
            precache: DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
            storage_quota: crate::kv::DEFAULT_QUOTA_BYTES,
        }
    }
}

fn default_origin() -> Url {
    Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL")
}

impl WorkerConfig {
    /// Start from the config file and apply runtime overrides on top
    pub fn from_options(options: ConfigOptions) -> Self {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable config file");
            Self::default()
        });
        config.apply(options);
        config
    }

    fn apply(&mut self, options: ConfigOptions) {
        if let Some(origin) = options.origin {
            self.origin = origin;
        }

        if let Some(version) = options.version {
            self.version = version;
        }

        if let Some(prefix) = options.store_prefix {
            self.store_prefix = prefix;
        }

        if let Some(data_dir) = options.data_dir {
            self.data_dir = data_dir;
        }
    }

    /// Path of the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_DIR)
            .join(CONFIG_FILE)
    }

    /// Load configuration from the config file
    ///
    /// Reads the `[worker]` table of ~/.ceylon-offline/config.toml. A missing
    /// file or table means defaults; a key with an unusable value keeps its
    /// default and is reported in the log.
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let table: toml::Table = contents
            .parse()
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        let mut config = Self::default();
        let Some(worker) = table.get("worker").and_then(|w| w.as_table()) else {
            return Ok(config);
        };

        for (key, value) in worker {
            let applied = match key.as_str() {
                "origin" => value
                    .as_str()
                    .and_then(|s| Url::parse(s).ok())
                    .map(|url| config.origin = url),
                "version" => value
                    .as_integer()
                    .and_then(|v| u32::try_from(v).ok())
                    .map(|v| config.version = v),
                "store_prefix" => value
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(|s| config.store_prefix = s.to_string()),
                "data_dir" => value
                    .as_str()
                    .map(|s| config.data_dir = PathBuf::from(s)),
                "precache" => value
                    .as_array()
                    .and_then(|items| {
                        items
                            .iter()
                            .map(|item| item.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .map(|paths| config.precache = paths),
                "storage_quota" => value
                    .as_integer()
                    .and_then(|v| usize::try_from(v).ok())
                    .map(|v| config.storage_quota = v),
                _ => {
                    warn!(key = %key, "Unknown worker config key");
                    Some(())
                }
            };

            if applied.is_none() {
                warn!(key = %key, value = %value, "Invalid worker config value, using default");
            }
        }

        Ok(config)
    }

    /// Ensure the data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).with_context(|| {
                format!("Failed to create data directory: {:?}", self.data_dir)
            })?;
        }
        Ok(())
    }

    pub fn stores_dir(&self) -> PathBuf {
        self.data_dir.join("stores")
    }

    pub fn local_storage_path(&self) -> PathBuf {
        self.data_dir.join("local_storage.json")
    }

    /// Precache paths resolved against the origin
    pub fn manifest(&self) -> Result<Vec<Url>> {
        self.precache
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .with_context(|| format!("Invalid precache path: {}", path))
            })
            .collect()
    }
}

/// Runtime options that override the config file
///
/// These are typically set via CLI flags like --origin or --data-dir.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub origin: Option<Url>,
    pub version: Option<u32>,
    pub store_prefix: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_store_prefix(mut self, prefix: String) -> Self {
        self.store_prefix = Some(prefix);
        self
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = Some(data_dir);
        self
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        if let Some(home) = std::env::var_os("HOME") {
            return Some(PathBuf::from(home));
        }

        #[cfg(windows)]
        {
            if let Some(user_profile) = std::env::var_os("USERPROFILE") {
                return Some(PathBuf::from(user_profile));
            }
        }

        None
    }
}
