//! Notifications emitted by the plugin
//!
//! Every live operation reports what it did, and every dry-run operation
//! reports what it would have done. Notifications carry tags so the host
//! environment can route or filter them.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Emitted by the ssh plugin
    Ssh,
    /// Describes an action that was skipped because of dry-run mode
    DryRun,
    /// Describes an action that was performed
    Trace,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::Ssh => "ssh",
            Tag::DryRun => "dryrun",
            Tag::Trace => "trace",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub tags: Vec<Tag>,
}

impl Notification {
    pub fn new(message: impl Into<String>, tags: &[Tag]) -> Self {
        Self {
            message: message.into(),
            tags: tags.to_vec(),
        }
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Delivers notifications to whatever is listening
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    /// Returns an error if the notification cannot be delivered
    async fn notify(
        &self,
        notification: Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes notifications to the tracing log
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        notification: Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tags = notification
            .tags
            .iter()
            .map(Tag::to_string)
            .collect::<Vec<_>>()
            .join(",");

        if notification.has_tag(Tag::Trace) {
            tracing::debug!(tags = %tags, "{}", notification.message);
        } else {
            tracing::info!(tags = %tags, "{}", notification.message);
        }
        Ok(())
    }
}

/// Notifier that collects notifications in memory
///
/// Useful for tests, or for callers that want to inspect what a script did.
#[derive(Default, Clone)]
pub struct MemoryNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.clear();
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(
        &self,
        notification: Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.notifications
            .lock()
            .map_err(|_| "notification store poisoned")?
            .push(notification);
        Ok(())
    }
}
