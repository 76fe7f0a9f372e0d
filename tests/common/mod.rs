//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ceylon_offline::http::{Request, Response};
use ceylon_offline::lifecycle::WorkerHost;
use ceylon_offline::network::{FetchError, Network};
use ceylon_offline::notification::Notification;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

pub const ORIGIN: &str = "http://localhost:5173";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> Url {
    origin().join(path).unwrap()
}

/// Network that answers from a script and records every request
#[derive(Default)]
pub struct ScriptedNetwork {
    responses: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    requests: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `url` with `response`
    pub fn respond(&self, url: &Url, response: Response) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Fail every request with a transport error while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &Url) -> usize {
        let target = url.to_string();
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| **u == target)
            .count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.requests.lock().unwrap().push(request.url.to_string());

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("network unreachable".to_string()));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

/// Host that records what the worker asked of it
#[derive(Default)]
pub struct RecordingHost {
    pub events: Mutex<Vec<String>>,
    pub fail_show: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl WorkerHost for RecordingHost {
    async fn skip_waiting(&self) {
        self.push("skip_waiting".to_string());
    }

    async fn claim_clients(&self) -> usize {
        self.push("claim_clients".to_string());
        2
    }

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail_show.load(Ordering::SeqCst) {
            anyhow::bail!("notifications blocked");
        }
        self.push(format!("show:{}", notification.title));
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) {
        self.push(format!("close:{}", notification.title));
    }

    async fn open_window(&self, url: &str) -> anyhow::Result<()> {
        self.push(format!("open:{}", url));
        Ok(())
    }
}
