//! End-to-end tests for the reminder store, exercising ordering,
//! persistence, sync fallback, scheduling, and delete/undo through the
//! public API with mock ports.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use memocue::database::initialize_database;
use memocue::model::{Priority, Reminder, ReminderDraft, ReminderPatch};
use memocue::ports::{
    BackgroundTaskPort, NotificationPayload, NotificationPort, PermissionState,
    RemoteCollectionPort, SnapshotFn, Unsubscribe,
};
use memocue::services::{ReminderStore, ScheduleState, StoreOptions};
use memocue::storage::SqliteKeyValueStore;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockNotifications {
    permission: Mutex<PermissionState>,
    shown: Mutex<Vec<(String, NotificationPayload)>>,
    closed: Mutex<Vec<String>>,
}

impl MockNotifications {
    fn granted() -> Self {
        Self {
            permission: Mutex::new(PermissionState::Granted),
            shown: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    fn shown_tags(&self) -> Vec<String> {
        self.shown.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl NotificationPort for MockNotifications {
    fn permission_state(&self) -> PermissionState {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> PermissionState {
        *self.permission.lock().unwrap()
    }

    async fn show(&self, id: &str, payload: &NotificationPayload) -> Result<()> {
        self.shown
            .lock()
            .unwrap()
            .push((id.to_string(), payload.clone()));
        Ok(())
    }

    async fn close(&self, id: &str) {
        self.closed.lock().unwrap().push(id.to_string());
    }
}

#[derive(Default)]
struct MockBackground {
    periodic_registrations: Mutex<Vec<String>>,
}

#[async_trait]
impl BackgroundTaskPort for MockBackground {
    async fn register_periodic(&self, tag: &str, _min_interval_ms: u64) -> bool {
        self.periodic_registrations
            .lock()
            .unwrap()
            .push(tag.to_string());
        true
    }

    async fn register_one_shot(&self, _tag: &str) -> bool {
        false
    }
}

#[derive(Default)]
struct MockRemote {
    upserts: Mutex<Vec<Reminder>>,
    deletes: Mutex<Vec<String>>,
    fail_permission: AtomicBool,
    snapshot_fn: Mutex<Option<SnapshotFn>>,
}

impl MockRemote {
    fn emit(&self, items: Vec<Reminder>) {
        let callback = self.snapshot_fn.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(items);
        }
    }

    fn upserted_ids(&self) -> Vec<String> {
        self.upserts.lock().unwrap().iter().map(|r| r.id.clone()).collect()
    }
}

#[async_trait]
impl RemoteCollectionPort for MockRemote {
    async fn subscribe(&self, _user_id: &str, on_snapshot: SnapshotFn) -> Result<Unsubscribe> {
        if self.fail_permission.load(Ordering::SeqCst) {
            return Err(anyhow!("permission-denied"));
        }
        *self.snapshot_fn.lock().unwrap() = Some(on_snapshot);
        Ok(Box::new(|| {}))
    }

    async fn upsert(&self, _user_id: &str, reminder: &Reminder) -> Result<()> {
        if self.fail_permission.load(Ordering::SeqCst) {
            return Err(anyhow!("permission-denied"));
        }
        self.upserts.lock().unwrap().push(reminder.clone());
        Ok(())
    }

    async fn delete(&self, _user_id: &str, id: &str) -> Result<()> {
        if self.fail_permission.load(Ordering::SeqCst) {
            return Err(anyhow!("permission-denied"));
        }
        self.deletes.lock().unwrap().push(id.to_string());
        Ok(())
    }

    fn is_permission_error(&self, err: &anyhow::Error) -> bool {
        err.to_string().contains("permission-denied")
    }
}

struct Harness {
    store: ReminderStore,
    remote: Arc<MockRemote>,
    notifications: Arc<MockNotifications>,
}

async fn build_harness(options: StoreOptions) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    initialize_database(&pool).await.unwrap();

    let remote = Arc::new(MockRemote::default());
    let notifications = Arc::new(MockNotifications::granted());
    let store = ReminderStore::new(
        Arc::new(SqliteKeyValueStore::new(pool)),
        remote.clone(),
        notifications.clone(),
        Arc::new(MockBackground::default()),
        options,
    );
    store.initialize().await;

    Harness {
        store,
        remote,
        notifications,
    }
}

fn draft(title: &str) -> ReminderDraft {
    ReminderDraft {
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_blank_title_is_declined_without_state_change() {
    let h = build_harness(StoreOptions::default()).await;

    assert!(h.store.create(draft("   ")).await.is_err());
    assert!(h.store.items().await.is_empty());
}

#[tokio::test]
async fn test_new_reminders_land_at_the_head() {
    let h = build_harness(StoreOptions::default()).await;

    h.store.create(draft("first")).await.unwrap();
    h.store.create(draft("second")).await.unwrap();
    h.store.create(draft("third")).await.unwrap();

    let titles: Vec<String> = h
        .store
        .items()
        .await
        .iter()
        .map(|r| r.title.clone())
        .collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn test_reorder_takes_the_midpoint_without_renumbering() {
    let h = build_harness(StoreOptions::default()).await;

    let a = h.store.create(draft("a")).await.unwrap();
    let b = h.store.create(draft("b")).await.unwrap();
    let c = h.store.create(draft("c")).await.unwrap();
    assert_eq!(a.order_index, Some(1024.0));
    assert_eq!(b.order_index, Some(2048.0));
    assert_eq!(c.order_index, Some(3072.0));

    // Display order is c, b, a. Drop c between b and a.
    h.store.reorder(&c.id, Some(&a.id), true).await.unwrap();

    let items = h.store.items().await;
    let keys: Vec<(String, f64)> = items
        .iter()
        .map(|r| (r.title.clone(), r.order_index.unwrap()))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("b".to_string(), 2048.0),
            ("c".to_string(), 1536.0),
            ("a".to_string(), 1024.0),
        ]
    );
}

#[tokio::test]
async fn test_delete_then_undo_restores_the_record() {
    let h = build_harness(StoreOptions::default()).await;

    h.store.create(draft("keep above")).await.unwrap();
    let victim = h.store.create(draft("victim")).await.unwrap();

    let token = h.store.delete(&victim.id).await.unwrap();
    assert_eq!(h.store.items().await.len(), 1);

    assert!(h.store.undo_delete(token).await);
    let items = h.store.items().await;
    assert_eq!(items.len(), 2);
    let restored = items.iter().find(|r| r.id == victim.id).unwrap();
    assert_eq!(restored.title, "victim");
    assert_eq!(restored.order_index, victim.order_index);
    // Restored to the head slot it was deleted from.
    assert_eq!(items[0].id, victim.id);

    // The token is single-use.
    assert!(!h.store.undo_delete(token).await);
}

#[tokio::test]
async fn test_undo_after_window_is_refused() {
    let h = build_harness(StoreOptions {
        undo_window: Duration::from_millis(60),
        ..Default::default()
    })
    .await;

    let victim = h.store.create(draft("victim")).await.unwrap();
    let token = h.store.delete(&victim.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!h.store.undo_delete(token).await);
    assert!(h.store.items().await.is_empty());
}

#[tokio::test]
async fn test_second_delete_invalidates_first_token() {
    let h = build_harness(StoreOptions::default()).await;

    let one = h.store.create(draft("one")).await.unwrap();
    let two = h.store.create(draft("two")).await.unwrap();

    let first = h.store.delete(&one.id).await.unwrap();
    let second = h.store.delete(&two.id).await.unwrap();

    assert!(!h.store.undo_delete(first).await);
    assert!(h.store.undo_delete(second).await);

    let items = h.store.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, two.id);
}

#[tokio::test]
async fn test_past_due_reminder_fires_immediately_once() {
    let h = build_harness(StoreOptions::default()).await;

    let item = h
        .store
        .create(ReminderDraft {
            due: Some(Utc::now() - ChronoDuration::minutes(5)),
            ..draft("overdue")
        })
        .await
        .unwrap();

    assert_eq!(h.notifications.shown_tags(), vec![item.id.clone()]);
    assert!(h.store.scheduler().scheduled_ids().await.is_empty());
    assert_eq!(h.store.scheduler().state_of(&item.id), ScheduleState::Fired);
}

#[tokio::test]
async fn test_preview_then_main_notification() {
    let h = build_harness(StoreOptions::default()).await;

    let now = Utc::now();
    let item = h
        .store
        .create(ReminderDraft {
            due: Some(now + ChronoDuration::milliseconds(300)),
            notify_at: Some(now + ChronoDuration::milliseconds(120)),
            ..draft("Pay rent")
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(
        h.notifications.shown_tags(),
        vec![format!("{}:preview", item.id), item.id.clone()]
    );
    assert_eq!(h.store.scheduler().state_of(&item.id), ScheduleState::Fired);
}

#[tokio::test]
async fn test_editing_due_rearms_the_timer() {
    let h = build_harness(StoreOptions::default()).await;

    let item = h
        .store
        .create(ReminderDraft {
            due: Some(Utc::now() + ChronoDuration::milliseconds(100)),
            ..draft("movable")
        })
        .await
        .unwrap();

    h.store
        .update(
            &item.id,
            ReminderPatch {
                due: Some(Some(Utc::now() + ChronoDuration::milliseconds(350))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The original deadline passes silently.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.notifications.shown_tags().is_empty());

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(h.notifications.shown_tags().len(), 1);
}

#[tokio::test]
async fn test_toggle_done_cancels_the_notification() {
    let h = build_harness(StoreOptions::default()).await;

    let item = h
        .store
        .create(ReminderDraft {
            due: Some(Utc::now() + ChronoDuration::milliseconds(150)),
            ..draft("soon done")
        })
        .await
        .unwrap();

    h.store.toggle_done(&item.id).await.unwrap();
    assert_eq!(
        h.store.scheduler().state_of(&item.id),
        ScheduleState::Cancelled
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.notifications.shown_tags().is_empty());
}

#[tokio::test]
async fn test_permission_refusal_falls_back_to_local_only() {
    let h = build_harness(StoreOptions::default()).await;
    h.remote.fail_permission.store(true, Ordering::SeqCst);

    h.store.sign_in("u1").await;
    assert!(h.store.is_local_only());

    // Local mutations keep working; nothing reaches the remote even
    // after the backend recovers.
    h.remote.fail_permission.store(false, Ordering::SeqCst);
    let item = h.store.create(draft("offline note")).await.unwrap();
    h.store.delete(&item.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.remote.upserts.lock().unwrap().is_empty());
    assert!(h.remote.deletes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sign_in_flushes_pending_edits() {
    let h = build_harness(StoreOptions::default()).await;

    let item = h.store.create(draft("made offline")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(h.remote.upserts.lock().unwrap().is_empty());
    assert!(h.store.items().await[0].pending_sync);

    h.store.sign_in("u1").await;

    assert_eq!(h.remote.upserted_ids(), vec![item.id.clone()]);
    assert!(!h.store.items().await[0].pending_sync);
}

#[tokio::test]
async fn test_snapshot_replaces_local_state() {
    let h = build_harness(StoreOptions::default()).await;

    h.store.create(draft("local only")).await.unwrap();
    h.store.sign_in("u1").await;

    let remote_item = Reminder::from_draft(draft("from remote"), Utc::now());
    h.remote.emit(vec![remote_item.clone()]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let items = h.store.items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, remote_item.id);
    assert!(!items[0].pending_sync);
}

#[tokio::test]
async fn test_pushes_clear_the_pending_flag() {
    let h = build_harness(StoreOptions::default()).await;
    h.store.sign_in("u1").await;

    let item = h.store.create(draft("synced")).await.unwrap();
    assert!(item.pending_sync);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let items = h.store.items().await;
    assert!(!items[0].pending_sync);
    assert_eq!(h.remote.upserted_ids(), vec![item.id]);
}

#[tokio::test]
async fn test_quick_add_extracts_metadata_and_due() {
    let h = build_harness(StoreOptions::default()).await;

    let item = h
        .store
        .quick_add("email parents tomorrow 4pm !high #school @30m")
        .await
        .unwrap();

    assert_eq!(item.priority, Priority::High);
    assert_eq!(item.category, "school");
    assert_eq!(item.estimate_ms, Some(30 * 60_000));

    let due = item.due.unwrap();
    let expected_date = (Utc::now() + ChronoDuration::days(1)).date_naive();
    assert_eq!(due.date_naive(), expected_date);
    assert_eq!(due.format("%H:%M").to_string(), "16:00");
}

#[tokio::test]
async fn test_export_import_round_trip_with_fresh_ids() {
    let h = build_harness(StoreOptions::default()).await;
    h.store.create(draft("exported one")).await.unwrap();
    h.store.create(draft("exported two")).await.unwrap();
    let json = h.store.export_json().await.unwrap();

    let target = build_harness(StoreOptions::default()).await;
    let count = target.store.import_json(&json).await.unwrap();
    assert_eq!(count, 2);

    let source_ids: Vec<String> = h.store.items().await.iter().map(|r| r.id.clone()).collect();
    let items = target.store.items().await;
    assert_eq!(items.len(), 2);
    for item in &items {
        assert!(!source_ids.contains(&item.id));
        assert!(item.pending_sync);
    }
}

#[tokio::test]
async fn test_import_over_the_cap_is_declined() {
    let h = build_harness(StoreOptions::default()).await;

    let oversized: Vec<Reminder> = (0..501)
        .map(|i| Reminder::from_draft(draft(&format!("bulk {i}")), Utc::now()))
        .collect();
    let json = serde_json::to_string(&oversized).unwrap();

    assert!(h.store.import_json(&json).await.is_err());
    assert!(h.store.items().await.is_empty());
}

#[tokio::test]
async fn test_counts_reflect_due_dates() {
    let h = build_harness(StoreOptions::default()).await;
    let now = Utc::now();

    h.store
        .create(ReminderDraft {
            due: Some(now - ChronoDuration::hours(1)),
            ..draft("overdue")
        })
        .await
        .unwrap();
    h.store.create(draft("undated")).await.unwrap();
    let done = h.store.create(draft("finished")).await.unwrap();
    h.store.toggle_done(&done.id).await.unwrap();

    let counts = h.store.counts(now).await;
    assert_eq!(counts.total, 3);
    assert_eq!(counts.overdue, 1);
    assert_eq!(counts.completed, 1);
}

#[tokio::test]
async fn test_change_listener_sees_every_publish() {
    let h = build_harness(StoreOptions::default()).await;

    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    h.store
        .on_change(move |items| sink.lock().unwrap().push(items.len()));

    h.store.create(draft("one")).await.unwrap();
    h.store.create(draft("two")).await.unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 2);
    assert_eq!(*seen.last().unwrap(), 2);
}
