//! Delete/undo manager
//!
//! Holds at most one restorable deletion at a time. A new deletion
//! replaces the previous slot, so only the most recent delete can be
//! undone. Each slot expires after a fixed window; expiry is enforced
//! both by a background timer and by a timestamp check on restore, so a
//! stale token is refused even if the timer has not run yet.

use crate::model::Reminder;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque handle identifying one deletion. Only the token returned by
/// the most recent delete can restore anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoToken(Uuid);

struct UndoSlot {
    token: UndoToken,
    reminder: Reminder,
    index: usize,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct UndoManager {
    inner: Arc<UndoInner>,
}

struct UndoInner {
    slot: Mutex<Option<UndoSlot>>,
    window: Duration,
}

impl UndoManager {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(UndoInner {
                slot: Mutex::new(None),
                window,
            }),
        }
    }

    /// Stash a deleted reminder and its display index. Replaces any
    /// previous slot, invalidating its token.
    pub fn open(&self, reminder: Reminder, index: usize) -> UndoToken {
        let token = UndoToken(Uuid::new_v4());
        let expires_at = Instant::now() + self.inner.window;
        {
            let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(UndoSlot {
                token,
                reminder,
                index,
                expires_at,
            });
        }

        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(inner) = inner.upgrade() {
                let mut slot = inner.slot.lock().unwrap_or_else(|e| e.into_inner());
                if slot.as_ref().map(|s| s.token) == Some(token) {
                    *slot = None;
                }
            }
        });

        token
    }

    /// Consume the slot if `token` still identifies it and the window has
    /// not elapsed. Returns the reminder and the display index it held.
    pub fn take(&self, token: UndoToken) -> Option<(Reminder, usize)> {
        let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(s) if s.token == token && Instant::now() < s.expires_at => {
                let s = slot.take()?;
                Some((s.reminder, s.index))
            }
            _ => None,
        }
    }
}
