//! Image preloading for galleries
//!
//! Warms the images store with the pictures around the one being shown so
//! that stepping through a gallery is served cache-first.

use crate::error::WorkerError;
use crate::http::{Destination, Request};
use crate::interceptor::Intercept;
use crate::lifecycle::ServiceWorker;
use crate::network::Network;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_PRELOAD_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadStatus {
    Loading,
    Loaded,
    Error,
}

/// Images to load for position `current`: the current one, the next
/// `count`, then the previous `count`, wrapping around both ends.
/// Duplicates and sources already in `known` are skipped.
pub fn preload_window(
    sources: &[String],
    count: usize,
    current: usize,
    known: &BTreeMap<String, PreloadStatus>,
) -> Vec<String> {
    if sources.is_empty() {
        return Vec::new();
    }

    let len = sources.len();
    let current = current % len;
    // A wider window only repeats sources
    let count = count.min(len);

    let mut indices = vec![current];
    indices.extend((1..=count).map(|i| (current + i) % len));
    indices.extend((1..=count).map(|i| (current + len - i % len) % len));

    let mut seen = HashSet::new();
    indices
        .into_iter()
        .map(|i| &sources[i])
        .filter(|src| !known.contains_key(*src))
        .filter(|src| seen.insert(src.as_str()))
        .cloned()
        .collect()
}

pub struct ImagePreloader {
    worker: Arc<ServiceWorker>,
    network: Arc<dyn Network>,
    count: usize,
    status: BTreeMap<String, PreloadStatus>,
}

impl ImagePreloader {
    pub fn new(worker: Arc<ServiceWorker>, network: Arc<dyn Network>) -> Self {
        Self {
            worker,
            network,
            count: DEFAULT_PRELOAD_COUNT,
            status: BTreeMap::new(),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn status(&self) -> &BTreeMap<String, PreloadStatus> {
        &self.status
    }

    /// Load the window around `current` and record how each image fared
    pub async fn preload(
        &mut self,
        sources: &[String],
        current: usize,
    ) -> &BTreeMap<String, PreloadStatus> {
        let targets = preload_window(sources, self.count, current, &self.status);
        for src in &targets {
            self.status.insert(src.clone(), PreloadStatus::Loading);
        }

        let this = &*self;
        let origin = this.worker.interceptor().origin();
        let loads = targets
            .iter()
            .map(|src| async move { (src.clone(), this.load(origin, src).await) });
        let results = futures::future::join_all(loads).await;

        for (src, status) in results {
            debug!(src = %src, status = ?status, "Preloaded image");
            self.status.insert(src, status);
        }
        &self.status
    }

    async fn load(&self, origin: &Url, src: &str) -> PreloadStatus {
        let url = match origin.join(src) {
            Ok(url) => url,
            Err(e) => {
                warn!(src, error = %e, "Invalid image source");
                return PreloadStatus::Error;
            }
        };
        let request = Request::get(url).with_destination(Destination::Image);

        let response = match self.worker.handle_fetch(&request).await {
            Ok(Intercept::Respond(resolved)) => Ok(resolved.response),
            Ok(Intercept::Bypass) => self.network.fetch(&request).await.map_err(WorkerError::from),
            Err(e) => Err(e),
        };

        match response {
            Ok(response) if response.is_ok() => PreloadStatus::Loaded,
            Ok(response) => {
                warn!(src, status = response.status, "Image failed to load");
                PreloadStatus::Error
            }
            Err(e) => {
                warn!(src, error = %e, "Image failed to load");
                PreloadStatus::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/img/{}.jpg", i)).collect()
    }

    #[test]
    fn test_window_wraps_both_ways() {
        let window = preload_window(&sources(10), 2, 0, &BTreeMap::new());
        assert_eq!(
            window,
            vec!["/img/0.jpg", "/img/1.jpg", "/img/2.jpg", "/img/9.jpg", "/img/8.jpg"]
        );
    }

    #[test]
    fn test_window_dedupes_small_galleries() {
        let window = preload_window(&sources(3), 3, 1, &BTreeMap::new());
        assert_eq!(window, vec!["/img/1.jpg", "/img/2.jpg", "/img/0.jpg"]);
    }

    #[test]
    fn test_window_skips_known_sources() {
        let mut known = BTreeMap::new();
        known.insert("/img/1.jpg".to_string(), PreloadStatus::Loaded);
        known.insert("/img/4.jpg".to_string(), PreloadStatus::Error);

        let window = preload_window(&sources(5), 1, 0, &known);
        assert_eq!(window, vec!["/img/0.jpg"]);
    }

    #[test]
    fn test_window_empty_and_out_of_range() {
        assert!(preload_window(&[], 3, 0, &BTreeMap::new()).is_empty());
        let window = preload_window(&sources(4), 0, 6, &BTreeMap::new());
        assert_eq!(window, vec!["/img/2.jpg"]);
    }

    #[test]
    fn test_window_with_huge_count_covers_gallery_once() {
        let window = preload_window(&sources(3), usize::MAX, 1, &BTreeMap::new());
        assert_eq!(window, vec!["/img/1.jpg", "/img/2.jpg", "/img/0.jpg"]);
    }
}
