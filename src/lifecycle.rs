//! Worker lifecycle
//!
//! A worker moves through explicit phases:
//!
//! ```text
//! Parsed -> Installing -> Installed -> Activating -> Active
//!               \
//!                `-> Redundant (install failed)
//! ```
//!
//! Install must finish (manifest fully stored) before activate may run, and
//! activate evicts stale stores before it claims clients. Only an active
//! worker intercepts fetches.

use crate::error::{Result, WorkerError};
use crate::http::Request;
use crate::interceptor::{FetchInterceptor, Intercept};
use crate::network::Network;
use crate::notification::{Notification, NotificationDispatcher};
use crate::store::StoreManager;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use url::Url;

pub const REGISTRATION_FILE: &str = "registration.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
    Redundant,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Parsed => "parsed",
            Phase::Installing => "installing",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Active => "active",
            Phase::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// The environment the worker runs in: clients, windows and notifications
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Let the installed version activate without waiting for old clients
    async fn skip_waiting(&self);

    /// Take control of every open client; returns how many were claimed
    async fn claim_clients(&self) -> usize;

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()>;

    async fn close_notification(&self, notification: &Notification);

    async fn open_window(&self, url: &str) -> anyhow::Result<()>;
}

/// Host that records every call in the log; used by the CLI
#[derive(Debug, Default)]
pub struct LoggingHost;

#[async_trait]
impl WorkerHost for LoggingHost {
    async fn skip_waiting(&self) {
        info!("Skipping waiting period");
    }

    async fn claim_clients(&self) -> usize {
        info!("Claiming clients");
        0
    }

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(title = %notification.title, body = %notification.body, "Showing notification");
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) {
        debug!(title = %notification.title, "Closing notification");
    }

    async fn open_window(&self, url: &str) -> anyhow::Result<()> {
        info!(url, "Opening window");
        Ok(())
    }
}

/// Summary of a completed activation
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    pub version: u32,
    pub evicted: Vec<String>,
    pub clients_claimed: usize,
}

/// One version of the worker
pub struct ServiceWorker {
    version: u32,
    manifest: Vec<Url>,
    stores: Arc<StoreManager>,
    network: Arc<dyn Network>,
    host: Arc<dyn WorkerHost>,
    interceptor: FetchInterceptor,
    notifications: NotificationDispatcher,
    phase: Mutex<Phase>,
}

impl ServiceWorker {
    /// Build a worker in the `Parsed` phase. The store manager's generation
    /// is the worker version.
    pub fn new(
        origin: Url,
        manifest: Vec<Url>,
        stores: Arc<StoreManager>,
        network: Arc<dyn Network>,
        host: Arc<dyn WorkerHost>,
    ) -> Self {
        let interceptor =
            FetchInterceptor::new(origin, Arc::clone(&stores), Arc::clone(&network));
        let notifications = NotificationDispatcher::new(Arc::clone(&host));

        Self {
            version: stores.generation(),
            manifest,
            stores,
            network,
            host,
            interceptor,
            notifications,
            phase: Mutex::new(Phase::Parsed),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn phase(&self) -> Phase {
        self.phase.lock().map(|p| *p).unwrap_or(Phase::Redundant)
    }

    pub fn stores(&self) -> &Arc<StoreManager> {
        &self.stores
    }

    pub fn interceptor(&self) -> &FetchInterceptor {
        &self.interceptor
    }

    /// Move from `expected` to `next`, failing if the worker is elsewhere
    fn transition(&self, action: &'static str, expected: Phase, next: Phase) -> Result<()> {
        let mut phase = self
            .phase
            .lock()
            .map_err(|_| WorkerError::Storage("worker phase lock poisoned".to_string()))?;
        let current = *phase;
        if current != expected {
            return Err(WorkerError::InvalidPhase {
                action,
                phase: current,
            });
        }
        debug!(version = self.version, from = %current, to = %next, "Phase transition");
        *phase = next;
        Ok(())
    }

    fn set_phase(&self, next: Phase) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = next;
        }
    }

    /// Precache the manifest into this version's static store.
    ///
    /// Precondition: `Parsed`. Postcondition: `Installed` with every manifest
    /// entry stored, or `Redundant` with none of them stored.
    pub async fn install(&self) -> Result<()> {
        self.transition("install", Phase::Parsed, Phase::Installing)?;
        info!(version = self.version, assets = self.manifest.len(), "Installing");

        if let Err(e) = self
            .stores
            .prepopulate(self.network.as_ref(), &self.manifest)
            .await
        {
            error!(version = self.version, error = %e, "Install failed");
            self.set_phase(Phase::Redundant);
            return Err(match e {
                e @ WorkerError::InstallFailed(_) => e,
                other => WorkerError::InstallFailed(other.to_string()),
            });
        }

        self.set_phase(Phase::Installed);
        self.host.skip_waiting().await;
        Ok(())
    }

    /// Remove every store outside this version, then take over clients.
    ///
    /// Precondition: `Installed`. Postcondition: `Active`, no stale stores.
    pub async fn activate(&self) -> Result<Activation> {
        self.transition("activate", Phase::Installed, Phase::Activating)?;
        info!(version = self.version, "Activating");

        let evicted = self.stores.evict_stale(&self.stores.valid_names()).await;
        let clients_claimed = self.host.claim_clients().await;

        self.set_phase(Phase::Active);
        info!(version = self.version, evicted = evicted.len(), "Active");

        Ok(Activation {
            version: self.version,
            evicted,
            clients_claimed,
        })
    }

    /// Adopt an installation that an earlier process already activated.
    ///
    /// Precondition: `Parsed`. Postcondition: `Active`.
    pub fn resume(&self) -> Result<()> {
        self.transition("resume", Phase::Parsed, Phase::Active)
    }

    /// Adopt an installation that is stored but still waiting to activate.
    ///
    /// Precondition: `Parsed`. Postcondition: `Installed`.
    pub fn resume_installed(&self) -> Result<()> {
        self.transition("resume", Phase::Parsed, Phase::Installed)
    }

    /// Offer a request to the worker. Anything arriving before activation
    /// goes straight to the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Intercept> {
        if self.phase() != Phase::Active {
            debug!(url = %request.url, phase = %self.phase(), "Worker not active, bypassing");
            return Ok(Intercept::Bypass);
        }
        self.interceptor.handle_fetch(request).await
    }

    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Option<Notification> {
        self.notifications.handle_push(payload).await
    }

    pub async fn handle_notification_click(&self, notification: &Notification) -> bool {
        self.notifications.handle_click(notification).await
    }

    /// Wait for detached write-backs to land
    pub async fn settle(&self) {
        self.interceptor.settle().await;
    }
}

/// Which version, if any, controls requests. Persisted between processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub installed_version: Option<u32>,
    pub active_version: Option<u32>,
    #[serde(default)]
    pub activated_at: Option<u64>,
}

impl Registration {
    /// Load the registration; a missing or unreadable file means nothing is active
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(REGISTRATION_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                error!(path = ?path, error = %e, "Corrupt registration, ignoring");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, data_dir: &Path) -> anyhow::Result<()> {
        let path = data_dir.join(REGISTRATION_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write registration: {:?}", path))?;
        Ok(())
    }

    /// Record `version` as installed and waiting; the active version is kept
    pub fn installed(mut self, version: u32) -> Self {
        self.installed_version = Some(version);
        self
    }

    pub fn activated(version: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .ok();
        Self {
            installed_version: Some(version),
            active_version: Some(version),
            activated_at: now,
        }
    }

    pub fn is_installed(&self, version: u32) -> bool {
        self.installed_version == Some(version)
    }

    pub fn is_active(&self, version: u32) -> bool {
        self.active_version == Some(version)
    }
}
