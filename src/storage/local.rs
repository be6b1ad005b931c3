//! Local persistence adapter
//!
//! Typed load/save of the two persisted records: the full reminder
//! collection and the scheduled-notification map. Saves must never fail
//! an operation — serialization or storage errors are logged and
//! swallowed, leaving in-memory state as the session's source of truth.

use crate::config::{REMINDERS_STORAGE_KEY, SCHEDULED_STORAGE_KEY};
use crate::model::{Reminder, ScheduledReminder};
use crate::ports::KeyValueStorePort;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStorePort>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStorePort>) -> Self {
        Self { kv }
    }

    /// Load a record, or `None` when absent or unreadable.
    async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!("Failed to read local record {}: {:#}", key, err);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("Discarding unreadable local record {}: {}", key, err);
                None
            }
        }
    }

    /// Save a record. Failures are logged and swallowed.
    async fn save<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!("Failed to serialize local record {}: {}", key, err);
                return;
            }
        };
        if let Err(err) = self.kv.set(key, &raw).await {
            tracing::error!("Failed to persist local record {}: {:#}", key, err);
        }
    }

    pub async fn load_reminders(&self) -> Vec<Reminder> {
        self.load(REMINDERS_STORAGE_KEY).await.unwrap_or_default()
    }

    pub async fn save_reminders(&self, items: &[Reminder]) {
        self.save(REMINDERS_STORAGE_KEY, &items).await;
    }

    pub async fn load_scheduled(&self) -> HashMap<String, ScheduledReminder> {
        self.load(SCHEDULED_STORAGE_KEY).await.unwrap_or_default()
    }

    pub async fn save_scheduled(&self, map: &HashMap<String, ScheduledReminder>) {
        self.save(SCHEDULED_STORAGE_KEY, map).await;
    }
}
