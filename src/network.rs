//! Network access used by the worker
//!
//! The worker never talks to `reqwest` directly; it goes through the
//! [`Network`] trait so the fetch strategies can be driven by a scripted
//! network in tests.

use crate::http::{Request, Response, ResponseType};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request that never produced a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Anything that can turn a request into a response
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// HTTP network backed by reqwest
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            origin,
        }
    }

    /// Typed by where the response came from after redirects. Same-origin
    /// responses are basic; cross-origin ones are only readable when the
    /// server opts in with CORS headers.
    fn response_type(&self, response: &reqwest::Response) -> ResponseType {
        if response.url().origin() == self.origin.origin() {
            ResponseType::Basic
        } else if response
            .headers()
            .contains_key(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
        {
            ResponseType::Cors
        } else {
            ResponseType::Opaque
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::Transport(format!("invalid method {}: {}", request.method, e)))?;

        debug!(method = %method, url = %request.url, "Fetching from network");
        let resp = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;

        let kind = self.response_type(&resp);
        if kind == ResponseType::Opaque {
            return Ok(Response::opaque());
        }

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
            .to_vec();

        debug!(status, size = body.len(), url = %request.url, "Network response");

        Ok(Response {
            status,
            kind,
            headers,
            body,
        })
    }
}
