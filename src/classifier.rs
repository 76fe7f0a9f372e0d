//! Request classification
//!
//! Maps every intercepted request onto the store it belongs to and the
//! strategy used to serve it. Rules are evaluated in order and the first
//! match wins, so every request gets exactly one policy.

use crate::http::{Destination, Request};
use crate::store::StoreName;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from the store, only consult the network on a miss
    CacheFirst,
    /// Always try the network, fall back to the store when it fails
    NetworkFirst,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst => write!(f, "cache-first"),
            Strategy::NetworkFirst => write!(f, "network-first"),
        }
    }
}

/// Caching policy derived for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub store: StoreName,
    pub strategy: Strategy,
    /// Advisory only. Entries are invalidated by store generation, never by age.
    pub max_age_secs: u64,
}

impl CachePolicy {
    const fn new(store: StoreName, strategy: Strategy, max_age_secs: u64) -> Self {
        Self {
            store,
            strategy,
            max_age_secs,
        }
    }
}

pub const API_POLICY: CachePolicy = CachePolicy::new(StoreName::Api, Strategy::NetworkFirst, HOUR);
pub const IMAGE_POLICY: CachePolicy =
    CachePolicy::new(StoreName::Images, Strategy::CacheFirst, 30 * DAY);
pub const DOCUMENT_POLICY: CachePolicy =
    CachePolicy::new(StoreName::Static, Strategy::NetworkFirst, DAY);
pub const ASSET_POLICY: CachePolicy =
    CachePolicy::new(StoreName::Static, Strategy::CacheFirst, 7 * DAY);

fn image_extension() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|svg|webp)$").expect("valid regex"))
}

fn html_extension() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.html$").expect("valid regex"))
}

/// Classify a request. Reads only the URL path and the declared destination.
pub fn classify(request: &Request) -> CachePolicy {
    let path = request.url.path();

    if path.contains("/api/") {
        return API_POLICY;
    }

    if request.destination == Destination::Image || image_extension().is_match(path) {
        return IMAGE_POLICY;
    }

    if request.destination == Destination::Document || html_extension().is_match(path) {
        return DOCUMENT_POLICY;
    }

    ASSET_POLICY
}
