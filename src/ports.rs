//! Capability ports
//!
//! Traits consumed by the core and implemented by platform-specific
//! adapters. Ports return `anyhow::Result` so backend failures stay
//! opaque; classification (such as spotting a permission refusal) is a
//! port method, called from exactly one place in the sync layer.

use crate::model::Reminder;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Payload attached to a delivered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub body: String,
    pub landing_path: String,
}

/// Physical notification delivery. `id` doubles as the identity tag:
/// showing under an id that is already visible replaces it, and
/// `close` dismisses whatever currently carries that tag.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    fn permission_state(&self) -> PermissionState;

    async fn request_permission(&self) -> PermissionState;

    async fn show(&self, id: &str, payload: &NotificationPayload) -> Result<()>;

    async fn close(&self, id: &str);

    /// Whether the platform can hold and fire a scheduled notification
    /// even when the originating process is not running.
    fn supports_triggers(&self) -> bool {
        false
    }

    /// Register a platform-held trigger firing at `at`.
    async fn schedule_at(
        &self,
        _id: &str,
        _at: DateTime<Utc>,
        _payload: &NotificationPayload,
    ) -> Result<()> {
        Err(anyhow!("trigger-based delivery is not supported"))
    }

    /// Unregister a previously scheduled trigger. Best-effort; an
    /// in-flight delivery may not be suppressed.
    async fn cancel_trigger(&self, _id: &str) {}
}

/// Background re-check registration for when trigger delivery is
/// unavailable. Both calls report whether the platform accepted the
/// registration.
#[async_trait]
pub trait BackgroundTaskPort: Send + Sync {
    async fn register_periodic(&self, tag: &str, min_interval_ms: u64) -> bool;

    async fn register_one_shot(&self, tag: &str) -> bool;
}

/// Snapshot callback invoked with the full remote collection contents.
pub type SnapshotFn = Arc<dyn Fn(Vec<Reminder>) + Send + Sync>;

/// Tears down a live snapshot subscription when invoked.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Opaque per-user remote document collection.
#[async_trait]
pub trait RemoteCollectionPort: Send + Sync {
    /// Establish a live snapshot subscription for one user.
    async fn subscribe(&self, user_id: &str, on_snapshot: SnapshotFn) -> Result<Unsubscribe>;

    async fn upsert(&self, user_id: &str, reminder: &Reminder) -> Result<()>;

    async fn delete(&self, user_id: &str, id: &str) -> Result<()>;

    /// Whether a failure from this backend is a permission refusal.
    fn is_permission_error(&self, err: &anyhow::Error) -> bool;
}

/// Durable on-device key-value storage.
#[async_trait]
pub trait KeyValueStorePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}
