//! Data model
//!
//! Reminder records and the scheduled-notification bookkeeping entries
//! derived from them. All models use serde with camelCase field names so
//! that exported/imported JSON matches the persisted document shape, and
//! every non-identity field carries a default so records written by older
//! builds deserialize cleanly (defaulting on read is the only migration
//! mechanism).

use crate::config::DEFAULT_CATEGORY;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reminder priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort weight, higher is more urgent.
    pub fn weight(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// A time-bound reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    /// Early heads-up instant, intended to precede `due`.
    #[serde(default)]
    pub notify_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Fractional display-order key, higher sorts first.
    #[serde(default)]
    pub order_index: Option<f64>,
    /// Local edit not yet confirmed written to the remote store.
    #[serde(default)]
    pub pending_sync: bool,
    #[serde(default)]
    pub pin_to_today: bool,
    /// Display-only duration estimate from quick-add metadata.
    #[serde(default)]
    pub estimate_ms: Option<u64>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Reminder {
    /// Build a new reminder from a draft. Does not validate the title;
    /// the store rejects blank titles before constructing anything.
    pub fn from_draft(draft: ReminderDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: draft.title.trim().to_string(),
            priority: draft.priority.unwrap_or_default(),
            category: normalize_category(draft.category.as_deref()),
            notes: draft.notes.unwrap_or_default(),
            due: draft.due,
            notify_at: draft.notify_at,
            done: false,
            created_at: now,
            updated_at: now,
            order_index: None,
            pending_sync: false,
            pin_to_today: draft.pin_to_today,
            estimate_ms: draft.estimate_ms,
        }
    }
}

/// Normalize a free-text category to the default when blank.
pub fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Create-reminder intent
#[derive(Debug, Clone, Default)]
pub struct ReminderDraft {
    pub title: String,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub notify_at: Option<DateTime<Utc>>,
    pub pin_to_today: bool,
    pub estimate_ms: Option<u64>,
}

/// Partial update to an existing reminder. Outer `Option` means "leave
/// unchanged"; the inner `Option` on clearable fields means "set to none".
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub notify_at: Option<Option<DateTime<Utc>>>,
    pub estimate_ms: Option<Option<u64>>,
}

/// Persisted bookkeeping for an armed notification, kept in lockstep with
/// the notification-relevant fields of its reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReminder {
    pub id: String,
    pub title: String,
    pub due: DateTime<Utc>,
    #[serde(default)]
    pub notify_at: Option<DateTime<Utc>>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub notes: String,
    /// Precomputed notification body.
    #[serde(default)]
    pub body: String,
    /// Landing page opened when the notification is activated.
    #[serde(default)]
    pub landing_path: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    /// Which delivery mechanism is currently armed: `true` when a
    /// platform-held trigger was registered for this entry.
    #[serde(default)]
    pub via_trigger: bool,
}

impl ScheduledReminder {
    /// Derive an entry from a reminder. `None` when the reminder has no
    /// due time or is already done (nothing to schedule).
    pub fn from_reminder(reminder: &Reminder, landing_path: &str) -> Option<Self> {
        if reminder.done {
            return None;
        }
        let due = reminder.due?;
        Some(Self {
            id: reminder.id.clone(),
            title: reminder.title.clone(),
            due,
            notify_at: reminder.notify_at,
            category: reminder.category.clone(),
            priority: reminder.priority,
            notes: reminder.notes.clone(),
            body: format!("Due {}", due.format("%H:%M")),
            landing_path: landing_path.to_string(),
            updated_at: reminder.updated_at,
            notified_at: None,
            via_trigger: false,
        })
    }
}

/// Summary counts for dashboard surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderCounts {
    pub today: usize,
    pub this_week: usize,
    pub overdue: usize,
    pub total: usize,
    pub completed: usize,
}

/// Compute summary counts against the supplied instant. The week runs
/// Monday through Sunday.
pub fn counts(items: &[Reminder], now: DateTime<Utc>) -> ReminderCounts {
    let today = now.date_naive();
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let week_end = week_start + Duration::days(6);

    let mut out = ReminderCounts {
        total: items.len(),
        ..Default::default()
    };
    for item in items {
        if item.done {
            out.completed += 1;
            continue;
        }
        let Some(due) = item.due else { continue };
        if due < now {
            out.overdue += 1;
        }
        let due_date = due.date_naive();
        if due_date == today {
            out.today += 1;
        }
        if due_date >= week_start && due_date <= week_end {
            out.this_week += 1;
        }
    }
    out
}
