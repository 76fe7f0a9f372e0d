//! Push messages and notification clicks

use crate::lifecycle::WorkerHost;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_ICON: &str = "/assets/icons/icon-192.png";
pub const DEFAULT_BADGE: &str = "/assets/icons/badge-72.png";

/// Structured push message body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Data attached to a shown notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A notification as handed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
}

pub struct NotificationDispatcher {
    host: Arc<dyn WorkerHost>,
    icon: String,
    badge: String,
}

impl NotificationDispatcher {
    pub fn new(host: Arc<dyn WorkerHost>) -> Self {
        Self {
            host,
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_BADGE.to_string(),
        }
    }

    pub fn with_icons(mut self, icon: &str, badge: &str) -> Self {
        self.icon = icon.to_string();
        self.badge = badge.to_string();
        self
    }

    /// Turn a push message into a notification.
    ///
    /// Empty or malformed payloads are dropped without showing anything.
    pub async fn handle_push(&self, payload: Option<&[u8]>) -> Option<Notification> {
        let bytes = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                debug!("Push without payload, ignoring");
                return None;
            }
        };

        let message: PushPayload = match serde_json::from_slice(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Malformed push payload, ignoring");
                return None;
            }
        };

        let notification = Notification {
            title: message.title,
            body: message.body,
            icon: self.icon.clone(),
            badge: self.badge.clone(),
            data: NotificationData { url: message.url },
        };

        if let Err(e) = self.host.show_notification(&notification).await {
            warn!(title = %notification.title, error = %e, "Failed to show notification");
            return None;
        }

        Some(notification)
    }

    /// Close the notification and open its target, if it has one.
    /// Returns whether a window was opened.
    pub async fn handle_click(&self, notification: &Notification) -> bool {
        self.host.close_notification(notification).await;

        let url = match notification.data.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => return false,
        };

        match self.host.open_window(url).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url, error = %e, "Failed to open window");
                false
            }
        }
    }
}
