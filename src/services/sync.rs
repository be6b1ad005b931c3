//! Remote sync layer
//!
//! Thin stateful wrapper over the remote collection port. Tracks the
//! signed-in user, the live snapshot subscription, and the sticky
//! local-only flag: the first permission refusal from the backend stops
//! all further remote traffic for the rest of the session. Non-permission
//! failures are logged and retried on the next mutation.

use crate::model::Reminder;
use crate::ports::{RemoteCollectionPort, SnapshotFn, Unsubscribe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct RemoteSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    port: Arc<dyn RemoteCollectionPort>,
    local_only: AtomicBool,
    user: Mutex<Option<String>>,
    subscription: Mutex<Option<Unsubscribe>>,
}

impl RemoteSync {
    pub fn new(port: Arc<dyn RemoteCollectionPort>) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                port,
                local_only: AtomicBool::new(false),
                user: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        }
    }

    pub fn set_user(&self, user_id: Option<&str>) {
        let mut user = self.inner.user.lock().unwrap_or_else(|e| e.into_inner());
        *user = user_id.map(str::to_string);
    }

    pub fn current_user(&self) -> Option<String> {
        self.inner
            .user
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether the session has fallen back to local-only persistence.
    /// Once set this never clears for the lifetime of the handle.
    pub fn is_local_only(&self) -> bool {
        self.inner.local_only.load(Ordering::SeqCst)
    }

    fn remote_allowed(&self) -> Option<String> {
        if self.is_local_only() {
            return None;
        }
        self.current_user()
    }

    /// Write one reminder to the remote collection. Returns whether the
    /// write was confirmed; `false` covers signed-out, local-only, and
    /// failed writes alike.
    pub async fn push(&self, reminder: &Reminder) -> bool {
        let Some(user) = self.remote_allowed() else {
            return false;
        };
        match self.inner.port.upsert(&user, reminder).await {
            Ok(()) => true,
            Err(err) => {
                self.note_failure("upsert", &err);
                false
            }
        }
    }

    /// Delete one reminder from the remote collection.
    pub async fn remove(&self, id: &str) -> bool {
        let Some(user) = self.remote_allowed() else {
            return false;
        };
        match self.inner.port.delete(&user, id).await {
            Ok(()) => true,
            Err(err) => {
                self.note_failure("delete", &err);
                false
            }
        }
    }

    /// Establish the live snapshot subscription for the current user,
    /// replacing any previous one.
    pub async fn subscribe(&self, on_snapshot: SnapshotFn) -> bool {
        let Some(user) = self.remote_allowed() else {
            return false;
        };
        match self.inner.port.subscribe(&user, on_snapshot).await {
            Ok(unsubscribe) => {
                let previous = {
                    let mut slot = self
                        .inner
                        .subscription
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    slot.replace(unsubscribe)
                };
                if let Some(unsubscribe) = previous {
                    unsubscribe();
                }
                true
            }
            Err(err) => {
                self.note_failure("subscribe", &err);
                false
            }
        }
    }

    /// Tear down the live subscription, if any.
    pub fn disconnect(&self) {
        let taken = {
            let mut slot = self
                .inner
                .subscription
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(unsubscribe) = taken {
            unsubscribe();
        }
    }

    fn note_failure(&self, op: &str, err: &anyhow::Error) {
        if self.inner.port.is_permission_error(err) {
            if !self.inner.local_only.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    "Remote {} refused by permissions, continuing local-only for this session",
                    op
                );
            }
            self.disconnect();
        } else {
            tracing::warn!("Remote {} failed: {:#}", op, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReminderDraft;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingRemote {
        upserts: AtomicUsize,
        deletes: AtomicUsize,
        fail_permission: AtomicBool,
        unsubscribed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RemoteCollectionPort for CountingRemote {
        async fn subscribe(&self, _user_id: &str, _on_snapshot: SnapshotFn) -> Result<Unsubscribe> {
            if self.fail_permission.load(Ordering::SeqCst) {
                return Err(anyhow!("permission-denied"));
            }
            let flag = self.unsubscribed.clone();
            Ok(Box::new(move || flag.store(true, Ordering::SeqCst)))
        }

        async fn upsert(&self, _user_id: &str, _reminder: &Reminder) -> Result<()> {
            if self.fail_permission.load(Ordering::SeqCst) {
                return Err(anyhow!("permission-denied"));
            }
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, _user_id: &str, _id: &str) -> Result<()> {
            if self.fail_permission.load(Ordering::SeqCst) {
                return Err(anyhow!("permission-denied"));
            }
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_permission_error(&self, err: &anyhow::Error) -> bool {
            err.to_string().contains("permission-denied")
        }
    }

    fn reminder() -> Reminder {
        Reminder::from_draft(
            ReminderDraft {
                title: "Water plants".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_push_requires_user() {
        let remote = Arc::new(CountingRemote::default());
        let sync = RemoteSync::new(remote.clone());

        assert!(!sync.push(&reminder()).await);
        assert_eq!(remote.upserts.load(Ordering::SeqCst), 0);

        sync.set_user(Some("u1"));
        assert!(sync.push(&reminder()).await);
        assert_eq!(remote.upserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_refusal_is_sticky() {
        let remote = Arc::new(CountingRemote::default());
        let sync = RemoteSync::new(remote.clone());
        sync.set_user(Some("u1"));

        remote.fail_permission.store(true, Ordering::SeqCst);
        assert!(!sync.push(&reminder()).await);
        assert!(sync.is_local_only());

        // Even after the backend recovers, the session stays local-only.
        remote.fail_permission.store(false, Ordering::SeqCst);
        assert!(!sync.push(&reminder()).await);
        assert!(!sync.remove("some-id").await);
        assert_eq!(remote.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(remote.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permission_refusal_drops_subscription() {
        let remote = Arc::new(CountingRemote::default());
        let sync = RemoteSync::new(remote.clone());
        sync.set_user(Some("u1"));

        assert!(sync.subscribe(Arc::new(|_| {})).await);
        assert!(!remote.unsubscribed.load(Ordering::SeqCst));

        remote.fail_permission.store(true, Ordering::SeqCst);
        assert!(!sync.push(&reminder()).await);
        assert!(remote.unsubscribed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_invokes_unsubscribe() {
        let remote = Arc::new(CountingRemote::default());
        let sync = RemoteSync::new(remote.clone());
        sync.set_user(Some("u1"));

        assert!(sync.subscribe(Arc::new(|_| {})).await);
        sync.disconnect();
        assert!(remote.unsubscribed.load(Ordering::SeqCst));
    }
}
