//! Notification scheduler
//!
//! Dual-path delivery for due reminders. When the platform can hold a
//! scheduled trigger it is registered so the notification fires even if
//! the process is gone; an in-process timer is always armed as well and
//! whichever path fires first wins, since both share the reminder id as
//! the notification tag. Platforms without triggers get a best-effort
//! background re-check registration instead.
//!
//! Every armed notification has a persisted bookkeeping entry. The entry
//! is the source of truth at fire time: a timer that wakes up and finds
//! its entry gone delivers nothing. Entries survive restarts; `restore`
//! fires anything past due exactly once and re-arms the rest.

use crate::config::{BACKGROUND_RECHECK_INTERVAL_MS, BACKGROUND_RECHECK_TAG};
use crate::model::{Reminder, ScheduledReminder};
use crate::ports::{BackgroundTaskPort, NotificationPayload, NotificationPort, PermissionState};
use crate::storage::LocalStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Lifecycle of one reminder's notification, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    Unscheduled,
    Scheduled,
    Fired,
    Cancelled,
}

struct ArmedTimers {
    main: JoinHandle<()>,
    preview: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    notifications: Arc<dyn NotificationPort>,
    background: Arc<dyn BackgroundTaskPort>,
    local: LocalStore,
    entries: tokio::sync::Mutex<HashMap<String, ScheduledReminder>>,
    timers: Mutex<HashMap<String, ArmedTimers>>,
    states: Mutex<HashMap<String, ScheduleState>>,
    background_registered: AtomicBool,
    landing_path: String,
}

fn payload_for(entry: &ScheduledReminder) -> NotificationPayload {
    NotificationPayload {
        id: entry.id.clone(),
        title: entry.title.clone(),
        body: entry.body.clone(),
        landing_path: entry.landing_path.clone(),
    }
}

fn preview_tag(id: &str) -> String {
    format!("{}:preview", id)
}

impl NotificationScheduler {
    pub fn new(
        notifications: Arc<dyn NotificationPort>,
        background: Arc<dyn BackgroundTaskPort>,
        local: LocalStore,
        landing_path: String,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                notifications,
                background,
                local,
                entries: tokio::sync::Mutex::new(HashMap::new()),
                timers: Mutex::new(HashMap::new()),
                states: Mutex::new(HashMap::new()),
                background_registered: AtomicBool::new(false),
                landing_path,
            }),
        }
    }

    /// (Re)schedule delivery for one reminder. Any previously armed
    /// delivery for the same id is cancelled first, so edits never leave
    /// a stale timer or trigger behind.
    pub async fn schedule(&self, reminder: &Reminder) {
        self.disarm(&reminder.id).await;

        let Some(mut entry) =
            ScheduledReminder::from_reminder(reminder, &self.inner.landing_path)
        else {
            // Done or no due time: nothing to deliver.
            let removed = {
                let mut entries = self.inner.entries.lock().await;
                entries.remove(&reminder.id).is_some()
            };
            if removed {
                self.inner.persist().await;
            }
            self.inner.set_state(&reminder.id, ScheduleState::Unscheduled);
            return;
        };

        let now = Utc::now();
        if entry.due <= now {
            // Already past due: fire once, never store an entry.
            self.inner.deliver(&entry.id, &payload_for(&entry)).await;
            let removed = {
                let mut entries = self.inner.entries.lock().await;
                entries.remove(&entry.id).is_some()
            };
            if removed {
                self.inner.persist().await;
            }
            self.inner.set_state(&entry.id, ScheduleState::Fired);
            return;
        }

        self.arm_entry(&mut entry, now).await;
        {
            let mut entries = self.inner.entries.lock().await;
            entries.insert(entry.id.clone(), entry.clone());
        }
        self.inner.persist().await;
        self.inner.set_state(&entry.id, ScheduleState::Scheduled);
    }

    /// Cancel any armed delivery and drop the bookkeeping entry.
    pub async fn cancel(&self, id: &str) {
        self.disarm(id).await;
        let removed = {
            let mut entries = self.inner.entries.lock().await;
            entries.remove(id).is_some()
        };
        if removed {
            self.inner.persist().await;
            self.inner.set_state(id, ScheduleState::Cancelled);
        }
    }

    /// Rebuild armed state from the persisted entry map after a restart.
    /// Entries past due fire exactly once and are cleared; the rest are
    /// re-armed against the current clock.
    pub async fn restore(&self) {
        let stored = self.inner.local.load_scheduled().await;
        let now = Utc::now();

        let mut kept: HashMap<String, ScheduledReminder> = HashMap::new();
        for (id, mut entry) in stored {
            if entry.due <= now {
                self.inner.deliver(&id, &payload_for(&entry)).await;
                self.inner.set_state(&id, ScheduleState::Fired);
            } else {
                // Trigger registrations do not reliably survive a restart.
                entry.via_trigger = false;
                self.arm_entry(&mut entry, now).await;
                self.inner.set_state(&id, ScheduleState::Scheduled);
                kept.insert(id, entry);
            }
        }

        {
            let mut entries = self.inner.entries.lock().await;
            *entries = kept;
        }
        self.inner.persist().await;
    }

    /// Bring armed state in line with a full collection snapshot:
    /// entries for vanished reminders are cancelled, everything else is
    /// rescheduled from its current fields.
    pub async fn sync_all(&self, items: &[Reminder]) {
        let live: HashSet<&str> = items.iter().map(|r| r.id.as_str()).collect();
        let stale: Vec<String> = {
            let entries = self.inner.entries.lock().await;
            entries
                .keys()
                .filter(|id| !live.contains(id.as_str()))
                .cloned()
                .collect()
        };
        for id in stale {
            self.cancel(&id).await;
        }
        for item in items {
            self.schedule(item).await;
        }
    }

    pub fn permission_state(&self) -> PermissionState {
        self.inner.notifications.permission_state()
    }

    pub async fn request_permission(&self) -> PermissionState {
        let before = self.inner.notifications.permission_state();
        let after = self.inner.notifications.request_permission().await;
        if before != PermissionState::Granted && after == PermissionState::Granted {
            // A fresh grant earns one new background-registration attempt.
            self.inner
                .background_registered
                .store(false, Ordering::SeqCst);
        }
        after
    }

    /// Last observed notification lifecycle state for a reminder.
    pub fn state_of(&self, id: &str) -> ScheduleState {
        self.inner
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
            .unwrap_or(ScheduleState::Unscheduled)
    }

    /// Ids with a live bookkeeping entry.
    pub async fn scheduled_ids(&self) -> Vec<String> {
        let entries = self.inner.entries.lock().await;
        entries.keys().cloned().collect()
    }

    /// Register the delivery paths for a future-due entry: a platform
    /// trigger when supported, the background re-check otherwise, and
    /// in-process timers whenever permission is granted.
    async fn arm_entry(&self, entry: &mut ScheduledReminder, now: DateTime<Utc>) {
        if self.inner.notifications.supports_triggers() {
            match self
                .inner
                .notifications
                .schedule_at(&entry.id, entry.due, &payload_for(entry))
                .await
            {
                Ok(()) => entry.via_trigger = true,
                Err(err) => {
                    entry.via_trigger = false;
                    tracing::debug!("Trigger registration failed for {}: {:#}", entry.id, err);
                }
            }
        } else {
            entry.via_trigger = false;
            self.ensure_background_recheck().await;
        }

        if self.inner.notifications.permission_state() == PermissionState::Granted {
            self.arm_timers(entry, now);
        }
    }

    fn arm_timers(&self, entry: &ScheduledReminder, now: DateTime<Utc>) {
        let weak = Arc::downgrade(&self.inner);
        let id = entry.id.clone();

        let main_delay = (entry.due - now).to_std().unwrap_or_default();
        let main = tokio::spawn({
            let weak = weak.clone();
            let id = id.clone();
            async move {
                tokio::time::sleep(main_delay).await;
                if let Some(inner) = weak.upgrade() {
                    fire(inner, id).await;
                }
            }
        });

        // Optional early heads-up, tagged separately so it never replaces
        // or suppresses the main notification.
        let preview = entry.notify_at.and_then(|at| {
            if at <= now || at >= entry.due {
                return None;
            }
            let delay = (at - now).to_std().ok()?;
            let tag = preview_tag(&entry.id);
            let mut payload = payload_for(entry);
            payload.id = tag.clone();
            let weak = weak.clone();
            Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(inner) = weak.upgrade() {
                    inner.deliver(&tag, &payload).await;
                }
            }))
        });

        let mut timers = self.inner.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.insert(id, ArmedTimers { main, preview });
    }

    /// Abort any in-process timers and unregister a platform trigger.
    async fn disarm(&self, id: &str) {
        let armed = {
            let mut timers = self.inner.timers.lock().unwrap_or_else(|e| e.into_inner());
            timers.remove(id)
        };
        if let Some(armed) = armed {
            armed.main.abort();
            if let Some(preview) = armed.preview {
                preview.abort();
            }
        }

        let via_trigger = {
            let entries = self.inner.entries.lock().await;
            entries.get(id).map(|e| e.via_trigger).unwrap_or(false)
        };
        if via_trigger {
            self.inner.notifications.cancel_trigger(id).await;
        }
    }

    /// One-time registration of the background re-check task, used when
    /// trigger delivery is unavailable. Falls back from periodic to
    /// one-shot registration.
    async fn ensure_background_recheck(&self) {
        if self
            .inner
            .background_registered
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        let periodic = self
            .inner
            .background
            .register_periodic(BACKGROUND_RECHECK_TAG, BACKGROUND_RECHECK_INTERVAL_MS)
            .await;
        if !periodic && !self.inner.background.register_one_shot(BACKGROUND_RECHECK_TAG).await {
            tracing::debug!("No background re-check mechanism available");
        }
    }
}

impl SchedulerInner {
    /// Close-then-show under the given tag. Silently skipped while
    /// permission is not granted.
    async fn deliver(&self, tag: &str, payload: &NotificationPayload) {
        if self.notifications.permission_state() != PermissionState::Granted {
            tracing::debug!("Skipping notification {} without permission", tag);
            return;
        }
        self.notifications.close(tag).await;
        if let Err(err) = self.notifications.show(tag, payload).await {
            tracing::warn!("Notification delivery failed for {}: {:#}", tag, err);
        }
    }

    async fn persist(&self) {
        let snapshot = {
            let entries = self.entries.lock().await;
            entries.clone()
        };
        self.local.save_scheduled(&snapshot).await;
    }

    fn set_state(&self, id: &str, state: ScheduleState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.insert(id.to_string(), state);
    }
}

/// Main-timer expiry. The entry map decides whether delivery still
/// applies; a cancelled or already-fired id finds no entry and returns.
async fn fire(inner: Arc<SchedulerInner>, id: String) {
    let entry = {
        let mut entries = inner.entries.lock().await;
        entries.remove(&id)
    };
    let Some(entry) = entry else {
        return;
    };

    // Drop the timer bookkeeping. Only the preview is aborted; the main
    // handle is this task.
    {
        let mut timers = inner.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(armed) = timers.remove(&id) {
            if let Some(preview) = armed.preview {
                preview.abort();
            }
        }
    }
    if entry.via_trigger {
        // The timer beat the platform trigger; suppress the duplicate.
        inner.notifications.cancel_trigger(&id).await;
    }

    inner.deliver(&id, &payload_for(&entry)).await;
    inner.persist().await;
    inner.set_state(&id, ScheduleState::Fired);
}
