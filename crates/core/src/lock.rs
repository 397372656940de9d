//! Selection change cooldown.
//!
//! After a committed selection change the selection is locked for one
//! calendar month. A user whose selection is still short of the tier's
//! required count may always edit, so a stale lock can never strand an
//! incomplete selection.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

/// Outcome of a lock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDecision {
    /// Whether the selection may be changed now.
    pub editable: bool,
    /// Lock expiry to persist alongside a committed change.
    pub next_lock_expiry: Option<DateTime<Utc>>,
}

/// One calendar month after `at`, clamped to the end of shorter months.
#[must_use]
pub fn add_one_month(at: DateTime<Utc>) -> DateTime<Utc> {
    at.checked_add_months(Months::new(1)).unwrap_or(at)
}

/// Decide whether a selection may change and what lock a change would leave.
///
/// A save while locked keeps the existing expiry: the window is never
/// shortened or extended by the client path. An unlocked save starts a fresh
/// one-month window.
#[must_use]
pub fn schedule_lock(
    now: DateTime<Utc>,
    lock_expiry: Option<DateTime<Utc>>,
    selection_len: usize,
    required_count: usize,
) -> LockDecision {
    let is_locked = lock_expiry.is_some_and(|until| now < until);
    let editable = !is_locked || selection_len < required_count;

    let next_lock_expiry = if is_locked {
        lock_expiry
    } else {
        Some(add_one_month(now))
    };

    LockDecision {
        editable,
        next_lock_expiry,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_no_lock_is_editable_and_starts_window() {
        let now = at(2026, 3, 10);
        let decision = schedule_lock(now, None, 3, 3);
        assert!(decision.editable);
        assert_eq!(decision.next_lock_expiry, Some(at(2026, 4, 10)));
    }

    #[test]
    fn test_active_lock_blocks_full_selection() {
        let now = at(2026, 3, 10);
        let until = at(2026, 3, 20);
        let decision = schedule_lock(now, Some(until), 3, 3);
        assert!(!decision.editable);
        assert_eq!(decision.next_lock_expiry, Some(until));
    }

    #[test]
    fn test_incomplete_selection_bypasses_lock_without_moving_it() {
        let now = at(2026, 3, 10);
        let until = at(2026, 3, 20);
        let decision = schedule_lock(now, Some(until), 2, 5);
        assert!(decision.editable);
        assert_eq!(decision.next_lock_expiry, Some(until));
    }

    #[test]
    fn test_lock_expires_at_boundary() {
        let now = at(2026, 3, 20);
        let decision = schedule_lock(now, Some(now), 1, 1);
        assert!(decision.editable);
        assert_eq!(decision.next_lock_expiry, Some(at(2026, 4, 20)));
    }

    #[test]
    fn test_month_end_clamps() {
        assert_eq!(add_one_month(at(2026, 1, 31)), at(2026, 2, 28));
    }
}
