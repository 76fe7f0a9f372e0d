//! Fetch interception
//!
//! Every same-origin request goes through [`FetchInterceptor::handle_fetch`]:
//! it is classified once, then served cache-first or network-first against
//! the store the classifier picked. Cross-origin requests are never touched.

use crate::classifier::{classify, CachePolicy, Strategy};
use crate::error::Result;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::store::StoreManager;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Where a resolved response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

/// A request the worker answered
#[derive(Debug, Clone)]
pub struct Resolved {
    pub response: Response,
    pub source: ResponseSource,
    pub policy: CachePolicy,
}

/// Outcome of offering a request to the worker
#[derive(Debug, Clone)]
pub enum Intercept {
    /// Not handled; the page talks to the network directly
    Bypass,
    Respond(Resolved),
}

impl Intercept {
    pub fn resolved(&self) -> Option<&Resolved> {
        match self {
            Intercept::Respond(resolved) => Some(resolved),
            Intercept::Bypass => None,
        }
    }
}

pub struct FetchInterceptor {
    origin: Url,
    stores: Arc<StoreManager>,
    network: Arc<dyn Network>,
    write_backs: Mutex<Vec<JoinHandle<()>>>,
}

impl FetchInterceptor {
    pub fn new(origin: Url, stores: Arc<StoreManager>, network: Arc<dyn Network>) -> Self {
        Self {
            origin,
            stores,
            network,
            write_backs: Mutex::new(Vec::new()),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Serve one request.
    ///
    /// Errors only when the network failed and no stored response could
    /// stand in for it.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Intercept> {
        if !request.is_same_origin(&self.origin) {
            debug!(url = %request.url, "Cross-origin request, bypassing");
            return Ok(Intercept::Bypass);
        }

        let policy = classify(request);
        debug!(
            url = %request.url,
            store = %policy.store,
            strategy = %policy.strategy,
            "Classified request"
        );

        let resolved = match policy.strategy {
            Strategy::CacheFirst => self.cache_first(request, policy).await?,
            Strategy::NetworkFirst => self.network_first(request, policy).await?,
        };

        Ok(Intercept::Respond(resolved))
    }

    async fn cache_first(&self, request: &Request, policy: CachePolicy) -> Result<Resolved> {
        if let Some(entry) = self.lookup(request, policy).await {
            debug!(url = %request.url, store = %policy.store, "Cache hit");
            return Ok(Resolved {
                response: entry,
                source: ResponseSource::Cache,
                policy,
            });
        }

        let response = self.network.fetch(request).await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Fetch failed");
            e
        })?;
        self.write_back(request, policy, &response);

        Ok(Resolved {
            response,
            source: ResponseSource::Network,
            policy,
        })
    }

    async fn network_first(&self, request: &Request, policy: CachePolicy) -> Result<Resolved> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.write_back(request, policy, &response);
                Ok(Resolved {
                    response,
                    source: ResponseSource::Network,
                    policy,
                })
            }
            Err(e) => {
                info!(url = %request.url, error = %e, "Network request failed, trying cache");
                match self.lookup(request, policy).await {
                    Some(response) => Ok(Resolved {
                        response,
                        source: ResponseSource::Cache,
                        policy,
                    }),
                    None => Err(e.into()),
                }
            }
        }
    }

    async fn lookup(&self, request: &Request, policy: CachePolicy) -> Option<Response> {
        if !is_storable(request) {
            return None;
        }
        self.stores
            .read(policy.store, &request.identity())
            .await
            .map(|entry| entry.response)
    }

    /// Detach a task that stores the response; the caller never waits on it
    fn write_back(&self, request: &Request, policy: CachePolicy, response: &Response) {
        if !response.is_cacheable() || !is_storable(request) {
            debug!(
                url = %request.url,
                status = response.status,
                method = %request.method,
                "Not caching response"
            );
            return;
        }

        let stores = Arc::clone(&self.stores);
        let identity = request.identity();
        let response = response.clone();
        let handle = tokio::spawn(async move {
            if !stores.write(policy.store, &identity, &response).await {
                warn!(request = %identity, store = %policy.store, "Write-back skipped");
            }
        });

        if let Ok(mut pending) = self.write_backs.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Wait for every write-back spawned so far
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = match self.write_backs.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };

        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Write-back task failed");
            }
        }
    }
}

/// Stores are keyed by GET requests only
fn is_storable(request: &Request) -> bool {
    request.method == "GET"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_get_is_storable() {
        let get = Request::parse("http://localhost/api/contact").unwrap();
        assert!(is_storable(&get));
        assert!(!is_storable(&get.clone().with_method("post")));
    }

    #[test]
    fn test_intercept_resolved() {
        assert!(Intercept::Bypass.resolved().is_none());
    }
}
