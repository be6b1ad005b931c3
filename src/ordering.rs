//! Ordering engine
//!
//! Assigns and rebalances fractional order keys for display ordering.
//! New items step by a fixed gap from the current extreme; moves take the
//! midpoint of their new neighbours. When a gap collapses below the
//! minimum usable spacing, a key goes missing, or too many keys have been
//! handed out since the last renumber, the whole collection is renumbered
//! to evenly spaced multiples of the gap constant.

use crate::config::{MAX_ASSIGNMENTS_BEFORE_REBALANCE, MIN_ORDER_SPACING, ORDER_GAP};
use crate::error::{CueError, Result};
use crate::model::Reminder;
use std::cmp::Ordering;

/// Where a freshly created item lands in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Head,
    Tail,
}

/// Deterministic order used when order keys cannot decide: done-status
/// ascending, due ascending with "no due" last, priority descending,
/// updated-at descending, then title.
pub fn tie_break(a: &Reminder, b: &Reminder) -> Ordering {
    a.done
        .cmp(&b.done)
        .then_with(|| match (a.due, b.due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.priority.weight().cmp(&a.priority.weight()))
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| a.title.cmp(&b.title))
}

/// Display order: order key descending, tie-break chain when keys are
/// equal, missing, or not finite.
pub fn display_cmp(a: &Reminder, b: &Reminder) -> Ordering {
    match (a.order_index, b.order_index) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() && x != y => {
            y.partial_cmp(&x).unwrap_or(Ordering::Equal)
        }
        _ => tie_break(a, b),
    }
}

/// Sort a collection into display order in place.
pub fn sort_for_display(items: &mut [Reminder]) {
    items.sort_by(display_cmp);
}

/// Stateful key assigner. Owns the assignment counter that bounds how
/// many keys are handed out before a renumber is forced.
#[derive(Debug, Default)]
pub struct OrderingEngine {
    assignments_since_rebalance: u32,
}

impl OrderingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a new item at the head or tail of the collection.
    pub fn assign_new_key(&mut self, items: &[Reminder], position: Position) -> f64 {
        self.assignments_since_rebalance += 1;
        let keys = finite_keys(items);
        if keys.is_empty() {
            return ORDER_GAP;
        }
        match position {
            Position::Head => max_key(&keys) + ORDER_GAP,
            Position::Tail => min_key(&keys) - ORDER_GAP,
        }
    }

    /// Move `moved_id` so it sits before (or after) `target_id`, or to the
    /// tail of the list when `target_id` is `None`. Returns whether the
    /// move forced a full renumber.
    pub fn reorder(
        &mut self,
        items: &mut Vec<Reminder>,
        moved_id: &str,
        target_id: Option<&str>,
        insert_before: bool,
    ) -> Result<bool> {
        sort_for_display(items);

        let moved_pos = items
            .iter()
            .position(|r| r.id == moved_id)
            .ok_or_else(|| CueError::NotFound(moved_id.to_string()))?;

        // Neighbour keys are taken from the list as it reads without the
        // moved item, at the slot it is dropping into.
        let rest: Vec<&Reminder> = items.iter().filter(|r| r.id != moved_id).collect();
        let slot = match target_id {
            Some(tid) => {
                let target_pos = rest
                    .iter()
                    .position(|r| r.id == tid)
                    .ok_or_else(|| CueError::NotFound(tid.to_string()))?;
                if insert_before {
                    target_pos
                } else {
                    target_pos + 1
                }
            }
            None => rest.len(),
        };

        let mut unusable_neighbour = false;
        let mut key_of = |idx: Option<usize>| -> Option<f64> {
            let r = rest.get(idx?)?;
            match r.order_index {
                Some(k) if k.is_finite() => Some(k),
                _ => {
                    unusable_neighbour = true;
                    None
                }
            }
        };
        let above = key_of(slot.checked_sub(1));
        let below = key_of(Some(slot));

        let new_key = match (above, below) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            (None, Some(b)) => b + ORDER_GAP,
            (Some(a), None) => a - ORDER_GAP,
            (None, None) => ORDER_GAP,
        };

        items[moved_pos].order_index = Some(new_key);
        self.assignments_since_rebalance += 1;

        let did_rebalance = if unusable_neighbour {
            self.rebalance(items);
            true
        } else {
            self.rebalance_if_needed(items)
        };
        sort_for_display(items);
        Ok(did_rebalance)
    }

    /// Renumber the whole collection when any key is missing or not
    /// finite, an adjacent gap has collapsed below the minimum spacing,
    /// or the assignment counter has hit its bound.
    pub fn rebalance_if_needed(&mut self, items: &mut [Reminder]) -> bool {
        if !self.needs_rebalance(items) {
            return false;
        }
        self.rebalance(items);
        true
    }

    fn needs_rebalance(&self, items: &[Reminder]) -> bool {
        if items.is_empty() {
            return false;
        }
        if self.assignments_since_rebalance >= MAX_ASSIGNMENTS_BEFORE_REBALANCE {
            return true;
        }
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            match item.order_index {
                Some(k) if k.is_finite() => keys.push(k),
                _ => return true,
            }
        }
        keys.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        keys.windows(2).any(|w| w[0] - w[1] < MIN_ORDER_SPACING)
    }

    /// Renumber every item to `(count - positionFromTop) * gap`. Position
    /// comes from the current display order; with no usable keys at all
    /// this degenerates to the pure tie-break chain, not insertion order.
    fn rebalance(&mut self, items: &mut [Reminder]) {
        sort_for_display(items);
        let count = items.len();
        for (pos, item) in items.iter_mut().enumerate() {
            item.order_index = Some((count - pos) as f64 * ORDER_GAP);
        }
        self.assignments_since_rebalance = 0;
        tracing::debug!("renumbered {} order keys", count);
    }
}

fn finite_keys(items: &[Reminder]) -> Vec<f64> {
    items
        .iter()
        .filter_map(|r| r.order_index)
        .filter(|k| k.is_finite())
        .collect()
}

fn max_key(keys: &[f64]) -> f64 {
    keys.iter().copied().fold(f64::MIN, f64::max)
}

fn min_key(keys: &[f64]) -> f64 {
    keys.iter().copied().fold(f64::MAX, f64::min)
}
