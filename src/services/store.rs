//! Reminder store
//!
//! The orchestrating facade: every mutation flows through here and fans
//! out to ordering, local persistence, remote sync, and the notification
//! scheduler. Local persistence is awaited on the mutation path (it
//! cannot fail an operation); remote pushes run fire-and-forget, with
//! the `pending_sync` flag on each record marking edits not yet
//! confirmed written remotely.
//!
//! Remote snapshots always win: applying one replaces in-memory state
//! wholesale, including records with unconfirmed local edits.

use crate::config::{DEFAULT_LANDING_PATH, DEFAULT_UNDO_WINDOW_MS, MAX_IMPORT_ITEMS};
use crate::error::{CueError, Result};
use crate::model::{self, normalize_category, Reminder, ReminderCounts, ReminderDraft, ReminderPatch};
use crate::ordering::{sort_for_display, OrderingEngine, Position};
use crate::ports::{
    BackgroundTaskPort, KeyValueStorePort, NotificationPort, PermissionState, RemoteCollectionPort,
    SnapshotFn,
};
use crate::quickadd::{extract_metadata, parse_quick_when};
use crate::services::scheduler::NotificationScheduler;
use crate::services::sync::RemoteSync;
use crate::services::undo::{UndoManager, UndoToken};
use crate::storage::LocalStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Invoked with the full collection in display order after every
/// published change.
pub type ChangeListener = Box<dyn Fn(&[Reminder]) + Send + Sync>;

/// Store construction knobs.
pub struct StoreOptions {
    pub undo_window: Duration,
    pub landing_path: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            undo_window: Duration::from_millis(DEFAULT_UNDO_WINDOW_MS),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ReminderStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: tokio::sync::Mutex<StoreState>,
    local: LocalStore,
    sync: RemoteSync,
    scheduler: NotificationScheduler,
    undo: UndoManager,
    listeners: Mutex<Vec<ChangeListener>>,
}

struct StoreState {
    items: Vec<Reminder>,
    ordering: OrderingEngine,
}

impl ReminderStore {
    pub fn new(
        kv: Arc<dyn KeyValueStorePort>,
        remote: Arc<dyn RemoteCollectionPort>,
        notifications: Arc<dyn NotificationPort>,
        background: Arc<dyn BackgroundTaskPort>,
        options: StoreOptions,
    ) -> Self {
        let local = LocalStore::new(kv);
        let scheduler = NotificationScheduler::new(
            notifications,
            background,
            local.clone(),
            options.landing_path,
        );
        Self {
            inner: Arc::new(StoreInner {
                state: tokio::sync::Mutex::new(StoreState {
                    items: Vec::new(),
                    ordering: OrderingEngine::new(),
                }),
                local,
                sync: RemoteSync::new(remote),
                scheduler,
                undo: UndoManager::new(options.undo_window),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Load persisted state and re-arm notifications. Call once before
    /// any other operation.
    pub async fn initialize(&self) {
        let loaded = self.inner.local.load_reminders().await;
        {
            let mut state = self.inner.state.lock().await;
            let st = &mut *state;
            st.items = loaded;
            st.ordering.rebalance_if_needed(&mut st.items);
            sort_for_display(&mut st.items);
        }
        self.inner.scheduler.restore().await;
        self.inner.commit().await;
    }

    /// Create a reminder at the head of the list. A blank title is
    /// declined without touching any state.
    pub async fn create(&self, draft: ReminderDraft) -> Result<Reminder> {
        if draft.title.trim().is_empty() {
            return Err(CueError::Validation("title must not be empty".to_string()));
        }
        let now = Utc::now();
        let item = {
            let mut state = self.inner.state.lock().await;
            let st = &mut *state;
            let mut item = Reminder::from_draft(draft, now);
            item.order_index = Some(st.ordering.assign_new_key(&st.items, Position::Head));
            item.pending_sync = true;
            let id = item.id.clone();
            st.items.push(item.clone());
            st.ordering.rebalance_if_needed(&mut st.items);
            sort_for_display(&mut st.items);
            st.items
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .unwrap_or(item)
        };
        self.inner.commit().await;
        self.spawn_push(item.clone());
        self.inner.scheduler.schedule(&item).await;
        Ok(item)
    }

    /// Apply a partial update. Notification scheduling is redone only
    /// when a notification-relevant field actually changed.
    pub async fn update(&self, id: &str, patch: ReminderPatch) -> Result<Reminder> {
        if let Some(title) = patch.title.as_deref() {
            if title.trim().is_empty() {
                return Err(CueError::Validation("title must not be empty".to_string()));
            }
        }
        let now = Utc::now();
        let (item, reschedule) = {
            let mut state = self.inner.state.lock().await;
            let item = state
                .items
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| CueError::NotFound(id.to_string()))?;

            let mut reschedule = false;
            if let Some(title) = patch.title {
                let title = title.trim().to_string();
                if title != item.title {
                    item.title = title;
                    reschedule = true;
                }
            }
            if let Some(priority) = patch.priority {
                if priority != item.priority {
                    item.priority = priority;
                    reschedule = true;
                }
            }
            if let Some(category) = patch.category {
                let category = normalize_category(Some(&category));
                if category != item.category {
                    item.category = category;
                    reschedule = true;
                }
            }
            if let Some(notes) = patch.notes {
                if notes != item.notes {
                    item.notes = notes;
                    reschedule = true;
                }
            }
            if let Some(due) = patch.due {
                if due != item.due {
                    item.due = due;
                    reschedule = true;
                }
            }
            if let Some(notify_at) = patch.notify_at {
                if notify_at != item.notify_at {
                    item.notify_at = notify_at;
                    reschedule = true;
                }
            }
            if let Some(estimate_ms) = patch.estimate_ms {
                item.estimate_ms = estimate_ms;
            }
            item.updated_at = now;
            item.pending_sync = true;
            let item = item.clone();
            sort_for_display(&mut state.items);
            (item, reschedule)
        };
        self.inner.commit().await;
        self.spawn_push(item.clone());
        if reschedule {
            self.inner.scheduler.schedule(&item).await;
        }
        Ok(item)
    }

    pub async fn toggle_done(&self, id: &str) -> Result<Reminder> {
        let item = {
            let mut state = self.inner.state.lock().await;
            let item = state
                .items
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| CueError::NotFound(id.to_string()))?;
            item.done = !item.done;
            item.updated_at = Utc::now();
            item.pending_sync = true;
            let item = item.clone();
            sort_for_display(&mut state.items);
            item
        };
        self.inner.commit().await;
        self.spawn_push(item.clone());
        if item.done {
            self.inner.scheduler.cancel(&item.id).await;
        } else {
            self.inner.scheduler.schedule(&item).await;
        }
        Ok(item)
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<Reminder> {
        let item = {
            let mut state = self.inner.state.lock().await;
            let item = state
                .items
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| CueError::NotFound(id.to_string()))?;
            item.pin_to_today = pinned;
            item.updated_at = Utc::now();
            item.pending_sync = true;
            item.clone()
        };
        self.inner.commit().await;
        self.spawn_push(item.clone());
        Ok(item)
    }

    /// Move `moved_id` relative to `target_id` (or to the tail when the
    /// target is absent). When the move forced a renumber every record
    /// gets pushed, otherwise only the moved one.
    pub async fn reorder(
        &self,
        moved_id: &str,
        target_id: Option<&str>,
        insert_before: bool,
    ) -> Result<()> {
        let now = Utc::now();
        let to_push: Vec<Reminder> = {
            let mut state = self.inner.state.lock().await;
            let st = &mut *state;
            let rebalanced = st
                .ordering
                .reorder(&mut st.items, moved_id, target_id, insert_before)?;
            let mut to_push = Vec::new();
            for item in st.items.iter_mut() {
                if item.id == moved_id {
                    item.updated_at = now;
                }
                if rebalanced || item.id == moved_id {
                    item.pending_sync = true;
                    to_push.push(item.clone());
                }
            }
            to_push
        };
        self.inner.commit().await;
        for item in to_push {
            self.spawn_push(item);
        }
        Ok(())
    }

    /// Remove a reminder, returning a token that can restore it until
    /// the undo window lapses or another delete replaces it.
    pub async fn delete(&self, id: &str) -> Result<UndoToken> {
        let (removed, index) = {
            let mut state = self.inner.state.lock().await;
            sort_for_display(&mut state.items);
            let index = state
                .items
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| CueError::NotFound(id.to_string()))?;
            (state.items.remove(index), index)
        };
        self.inner.commit().await;
        self.inner.scheduler.cancel(id).await;
        self.spawn_remove(id.to_string());
        Ok(self.inner.undo.open(removed, index))
    }

    /// Restore the deletion identified by `token`. Returns whether
    /// anything was restored.
    pub async fn undo_delete(&self, token: UndoToken) -> bool {
        let Some((mut reminder, index)) = self.inner.undo.take(token) else {
            return false;
        };
        reminder.updated_at = Utc::now();
        reminder.pending_sync = true;
        let item = {
            let mut state = self.inner.state.lock().await;
            let index = index.min(state.items.len());
            state.items.insert(index, reminder.clone());
            sort_for_display(&mut state.items);
            reminder
        };
        self.inner.commit().await;
        self.spawn_push(item.clone());
        self.inner.scheduler.schedule(&item).await;
        true
    }

    /// Create a reminder from one typed line, pulling metadata tokens
    /// and a natural-language date/time out of the text.
    pub async fn quick_add(&self, text: &str) -> Result<Reminder> {
        let meta = extract_metadata(text);
        let when = parse_quick_when(&meta.text, Utc::now());
        self.create(ReminderDraft {
            title: meta.text,
            priority: Some(meta.priority),
            category: Some(meta.category),
            due: when.due(),
            estimate_ms: meta.estimate_ms,
            ..Default::default()
        })
        .await
    }

    /// Serialize the full collection as pretty-printed JSON.
    pub async fn export_json(&self) -> Result<String> {
        let items = {
            let state = self.inner.state.lock().await;
            state.items.clone()
        };
        Ok(serde_json::to_string_pretty(&items)?)
    }

    /// Import reminders from exported JSON. Records get fresh identities
    /// and land at the head of the list; blank-titled records are
    /// skipped. Returns how many were imported.
    pub async fn import_json(&self, json: &str) -> Result<usize> {
        let incoming: Vec<Reminder> = serde_json::from_str(json)?;
        if incoming.len() > MAX_IMPORT_ITEMS {
            return Err(CueError::Validation(format!(
                "import exceeds {} items",
                MAX_IMPORT_ITEMS
            )));
        }
        let now = Utc::now();
        let imported: Vec<Reminder> = {
            let mut state = self.inner.state.lock().await;
            let st = &mut *state;
            let mut imported = Vec::new();
            for mut item in incoming {
                if item.title.trim().is_empty() {
                    continue;
                }
                item.id = Uuid::new_v4().to_string();
                item.title = item.title.trim().to_string();
                item.category = normalize_category(Some(&item.category));
                item.created_at = now;
                item.updated_at = now;
                item.pending_sync = true;
                item.order_index = Some(st.ordering.assign_new_key(&st.items, Position::Head));
                st.items.push(item.clone());
                imported.push(item);
            }
            st.ordering.rebalance_if_needed(&mut st.items);
            sort_for_display(&mut st.items);
            for imp in imported.iter_mut() {
                if let Some(current) = st.items.iter().find(|r| r.id == imp.id) {
                    imp.order_index = current.order_index;
                }
            }
            imported
        };
        self.inner.commit().await;
        for item in &imported {
            self.inner.scheduler.schedule(item).await;
        }
        let count = imported.len();
        for item in imported {
            self.spawn_push(item);
        }
        Ok(count)
    }

    /// Connect a signed-in user: flush edits made while offline, then
    /// subscribe to remote snapshots.
    pub async fn sign_in(&self, user_id: &str) {
        self.inner.sync.set_user(Some(user_id));
        self.flush_pending().await;

        let weak = Arc::downgrade(&self.inner);
        let on_snapshot: SnapshotFn = Arc::new(move |items: Vec<Reminder>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                apply_snapshot(inner, items).await;
            });
        });
        self.inner.sync.subscribe(on_snapshot).await;
    }

    /// Drop the remote session and fall back to local state.
    pub async fn sign_out(&self) {
        self.inner.sync.disconnect();
        self.inner.sync.set_user(None);

        let loaded = self.inner.local.load_reminders().await;
        {
            let mut state = self.inner.state.lock().await;
            let st = &mut *state;
            st.items = loaded;
            st.ordering.rebalance_if_needed(&mut st.items);
            sort_for_display(&mut st.items);
        }
        let items = self.inner.commit().await;
        self.inner.scheduler.sync_all(&items).await;
    }

    /// Ask the platform for notification permission. A fresh grant
    /// re-arms everything schedulable.
    pub async fn request_notification_permission(&self) -> PermissionState {
        let before = self.inner.scheduler.permission_state();
        let after = self.inner.scheduler.request_permission().await;
        if before != PermissionState::Granted && after == PermissionState::Granted {
            let items = {
                let state = self.inner.state.lock().await;
                state.items.clone()
            };
            self.inner.scheduler.sync_all(&items).await;
        }
        after
    }

    /// Current collection in display order.
    pub async fn items(&self) -> Vec<Reminder> {
        let state = self.inner.state.lock().await;
        state.items.clone()
    }

    pub async fn counts(&self, now: DateTime<Utc>) -> ReminderCounts {
        let state = self.inner.state.lock().await;
        model::counts(&state.items, now)
    }

    pub fn on_change(&self, listener: impl Fn(&[Reminder]) + Send + Sync + 'static) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        listeners.push(Box::new(listener));
    }

    pub fn is_local_only(&self) -> bool {
        self.inner.sync.is_local_only()
    }

    pub fn scheduler(&self) -> &NotificationScheduler {
        &self.inner.scheduler
    }

    /// Push records still flagged pending, clearing the flag on each
    /// confirmed write. Records edited again mid-flight keep the flag.
    async fn flush_pending(&self) {
        let pending: Vec<Reminder> = {
            let state = self.inner.state.lock().await;
            state.items.iter().filter(|r| r.pending_sync).cloned().collect()
        };
        if pending.is_empty() {
            return;
        }
        let mut confirmed = Vec::new();
        for item in &pending {
            if self.inner.sync.push(item).await {
                confirmed.push(item.clone());
            }
        }
        if confirmed.is_empty() {
            return;
        }
        {
            let mut state = self.inner.state.lock().await;
            for pushed in &confirmed {
                if let Some(item) = state.items.iter_mut().find(|r| r.id == pushed.id) {
                    if item.updated_at == pushed.updated_at {
                        item.pending_sync = false;
                    }
                }
            }
        }
        self.inner.commit().await;
    }

    fn spawn_push(&self, item: Reminder) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.sync.push(&item).await {
                confirm_pushed(&inner, &item).await;
            }
        });
    }

    fn spawn_remove(&self, id: String) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            if let Some(inner) = weak.upgrade() {
                inner.sync.remove(&id).await;
            }
        });
    }
}

impl StoreInner {
    /// Persist current state and publish it to listeners.
    async fn commit(&self) -> Vec<Reminder> {
        let items = {
            let state = self.state.lock().await;
            state.items.clone()
        };
        self.local.save_reminders(&items).await;
        self.notify(&items);
        items
    }

    fn notify(&self, items: &[Reminder]) {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener(items);
        }
    }
}

/// Clear the pending flag after a confirmed push, unless the record was
/// edited again while the push was in flight.
async fn confirm_pushed(inner: &Arc<StoreInner>, pushed: &Reminder) {
    let changed = {
        let mut state = inner.state.lock().await;
        match state.items.iter_mut().find(|r| r.id == pushed.id) {
            Some(item) if item.pending_sync && item.updated_at == pushed.updated_at => {
                item.pending_sync = false;
                true
            }
            _ => false,
        }
    };
    if changed {
        inner.commit().await;
    }
}

/// Apply a remote snapshot: full replacement of in-memory state.
async fn apply_snapshot(inner: Arc<StoreInner>, mut items: Vec<Reminder>) {
    for item in items.iter_mut() {
        item.title = item.title.trim().to_string();
        item.category = normalize_category(Some(&item.category));
        item.pending_sync = false;
    }
    {
        let mut state = inner.state.lock().await;
        let st = &mut *state;
        st.items = items;
        st.ordering.rebalance_if_needed(&mut st.items);
        sort_for_display(&mut st.items);
    }
    let items = inner.commit().await;
    inner.scheduler.sync_all(&items).await;
}
