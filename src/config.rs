//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the engine.

// ===== Ordering =====

/// Gap between adjacent order keys after a renumber, and the step used
/// when inserting at either end of the collection.
pub const ORDER_GAP: f64 = 1024.0;

/// Minimum usable spacing between adjacent order keys. A gap below this
/// cannot be subdivided by further midpoint inserts and forces a full
/// renumber of the collection.
pub const MIN_ORDER_SPACING: f64 = 1.0;

/// Key assignments tolerated since the last renumber before a renumber
/// is forced regardless of gap sizes. Bounds floating-point precision
/// drift from repeated same-position insertions.
pub const MAX_ASSIGNMENTS_BEFORE_REBALANCE: u32 = 32;

// ===== Delete/undo =====

/// How long a deleted reminder stays restorable.
pub const DEFAULT_UNDO_WINDOW_MS: u64 = 6_000;

// ===== Notifications =====

/// Minimum interval requested for the periodic background re-check task
/// used when trigger-based delivery is unavailable.
pub const BACKGROUND_RECHECK_INTERVAL_MS: u64 = 60_000;

/// Tag under which the background re-check task is registered.
pub const BACKGROUND_RECHECK_TAG: &str = "reminder-recheck";

/// Landing page opened when a notification is activated.
pub const DEFAULT_LANDING_PATH: &str = "index.html#reminders";

// ===== Persistence =====

/// Storage key for the full reminder collection.
pub const REMINDERS_STORAGE_KEY: &str = "reminders";

/// Storage key for the scheduled-notification map.
pub const SCHEDULED_STORAGE_KEY: &str = "scheduledReminders";

// ===== Data limits =====

/// Category assigned when the user leaves the field blank.
pub const DEFAULT_CATEGORY: &str = "general";

/// Maximum number of reminders accepted from a JSON import.
pub const MAX_IMPORT_ITEMS: usize = 500;
