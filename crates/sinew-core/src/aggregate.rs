//! Derived numeric facts over a single work item.
//!
//! Every function here is pure: it takes an immutable snapshot (plus `now`
//! where wall time matters) and computes the answer on demand. Nothing is
//! cached on the entity, and nothing traverses the hierarchy — an item's
//! metrics are local. Rollups across a subtree are a caller concern.

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::model::item::{Status, WorkItem};

/// Checklist completion as a percentage in `[0, 100]`; 0 when the
/// checklist is empty.
///
/// Independent of `item.progress` — the two are separate metrics and the
/// engine never copies one into the other.
pub fn checklist_progress(item: &WorkItem) -> f64 {
    let total = item.checklist.len();
    if total == 0 {
        return 0.0;
    }
    let completed = item.checklist.iter().filter(|e| e.completed).count();
    #[allow(clippy::cast_precision_loss)]
    {
        (completed as f64 / total as f64) * 100.0
    }
}

/// Accumulate logged time onto `item`.
///
/// `actual_hours += hours`. Cost resolution, in order: an explicit cost is
/// added as given; otherwise `hours × hourly_rate` when a rate is set;
/// otherwise cost is unchanged.
///
/// # Errors
///
/// `InvalidArgument` if `hours` is negative or not finite, or if
/// `explicit_cost` is negative or not finite.
pub fn log_time(item: &mut WorkItem, hours: f64, explicit_cost: Option<f64>) -> Result<()> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(EngineError::InvalidArgument(format!(
            "logged hours must be a non-negative number, got {hours}"
        )));
    }
    if let Some(cost) = explicit_cost {
        if !cost.is_finite() || cost < 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "explicit cost must be a non-negative number, got {cost}"
            )));
        }
    }

    item.actual_hours += hours;
    match (explicit_cost, item.hourly_rate) {
        (Some(cost), _) => item.actual_cost += cost,
        (None, Some(rate)) => item.actual_cost += hours * rate,
        (None, None) => {}
    }
    Ok(())
}

/// `actual_cost − estimated_cost`; 0 when no estimate is set.
pub fn cost_variance(item: &WorkItem) -> f64 {
    item.estimated_cost
        .map_or(0.0, |estimate| item.actual_cost - estimate)
}

/// `actual_hours − estimated_hours`; 0 when no estimate is set.
pub fn time_variance(item: &WorkItem) -> f64 {
    item.estimated_hours
        .map_or(0.0, |estimate| item.actual_hours - estimate)
}

/// An item is overdue when a due date is set, `now` is past it, and the
/// item is still in play (not `Done`, `Cancelled`, or `Closed`).
pub fn is_overdue(item: &WorkItem, now: DateTime<Utc>) -> bool {
    let Some(due) = item.due_date else {
        return false;
    };
    if matches!(
        item.status,
        Status::Done | Status::Cancelled | Status::Closed
    ) {
        return false;
    }
    now > due
}

/// Whole days until the due date (ceiling), negative when past due.
/// `None` when no due date is set.
pub fn days_until_due(item: &WorkItem, now: DateTime<Utc>) -> Option<i64> {
    let due = item.due_date?;
    let seconds = (due - now).num_seconds();
    Some(div_ceil_seconds(seconds))
}

/// Elapsed whole days (ceiling) from start to completion. `None` unless
/// both `start_date` and `completed_at` are set.
pub fn duration_days(item: &WorkItem) -> Option<i64> {
    let start = item.start_date?;
    let completed = item.completed_at?;
    let seconds = (completed - start).num_seconds();
    Some(div_ceil_seconds(seconds))
}

const SECONDS_PER_DAY: i64 = 86_400;

/// Ceiling division of seconds into days, correct for negative spans.
const fn div_ceil_seconds(seconds: i64) -> i64 {
    if seconds >= 0 {
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    } else {
        seconds / SECONDS_PER_DAY
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
