//! Transient notification log.
//!
//! Per-token transfer failures and operation-scoped service errors surface
//! here for the UI to render; nothing in this log is fatal or persistent.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Notifications kept before the oldest are dropped.
const NOTIFICATION_CAPACITY: usize = 50;

/// A notification entry with message and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Local>,
}

impl NotificationEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: chrono::Local::now(),
        }
    }

    pub fn time_ago(&self) -> String {
        let now = chrono::Local::now();
        let duration = now.signed_duration_since(self.timestamp);
        if duration.num_seconds() < 60 {
            "just now".to_string()
        } else if duration.num_minutes() < 60 {
            format!("{}m ago", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h ago", duration.num_hours())
        } else {
            self.timestamp.format("%m/%d %H:%M").to_string()
        }
    }
}

/// Cloneable handle to the session's notification feed.
#[derive(Clone)]
pub struct NotificationLog {
    entries: Arc<Mutex<VecDeque<NotificationEntry>>>,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationLog {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub async fn push(&self, message: impl Into<String>) {
        let mut entries = self.entries.lock().await;
        entries.push_back(NotificationEntry::new(message));
        while entries.len() > NOTIFICATION_CAPACITY {
            entries.pop_front();
        }
    }

    /// Newest-last copy of the current entries.
    pub async fn recent(&self) -> Vec<NotificationEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
