//! The work-item lifecycle state machine.
//!
//! # Overview
//!
//! One authoritative transition table over the closed [`Status`]
//! enumeration; anything not listed is rejected. The functions here are
//! pure: they validate a proposed transition or apply its side effects to
//! an owned snapshot. Dependency gating (the can-start guard for
//! `InProgress` and `Done`) needs graph access and therefore lives in the
//! service layer, which consults [`crate::graph::resolve`] before calling
//! [`apply`].
//!
//! # Side effects
//!
//! - entering `Done` stamps `completed_at` and forces progress to 100
//! - leaving `Done` (or any terminal status) via reopen clears
//!   `completed_at` and resets progress to 0
//! - entering `Blocked` stashes the caller's reason; leaving it clears it
//!
//! The `completed_at` field is kept set *iff* the status is `Done` — a
//! `Done → Closed` transition clears it.

use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::model::item::{Status, WorkItem};

/// Is `from → to` in the transition table?
///
/// Self-transitions are never allowed. Terminal statuses (`Done`,
/// `Cancelled`, `Closed`) only transition back to `Todo` (reopen), with
/// `Done → Closed` as the single exception.
#[must_use]
pub const fn allowed(from: Status, to: Status) -> bool {
    use Status::{
        Blocked, Cancelled, Closed, Done, InProgress, InReview, OnHold, Testing, Todo,
    };
    matches!(
        (from, to),
        (Todo, InProgress | Blocked | OnHold | Cancelled | Done)
            | (InProgress, InReview | Testing | Done | Blocked | OnHold | Cancelled | Todo)
            | (InReview, InProgress | Testing | Done | Blocked | OnHold | Cancelled)
            | (Testing, InProgress | InReview | Done | Blocked | OnHold | Cancelled)
            | (Blocked, Todo | Done)
            | (OnHold, Todo | Blocked | Done | Cancelled)
            | (Done, Todo | Closed)
            | (Cancelled, Todo)
            | (Closed, Todo)
    )
}

/// Validate a proposed transition for `item`, or fail with
/// `IllegalTransition` naming the rejected pair.
///
/// # Errors
///
/// `IllegalTransition` if `item.status → to` is not in the table.
pub fn check(item: &WorkItem, to: Status) -> Result<()> {
    if allowed(item.status, to) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition {
            id: item.id.clone(),
            from: item.status,
            to,
        })
    }
}

/// Does entering `to` require the dependency gate (`can_start`)?
#[must_use]
pub const fn requires_gate(to: Status) -> bool {
    matches!(to, Status::InProgress | Status::Done)
}

/// Apply a validated transition's side effects to `item`.
///
/// Legality and gating must have been checked already; this function only
/// executes the table's side-effect column.
pub fn apply(item: &mut WorkItem, to: Status, reason: Option<String>, now: DateTime<Utc>) {
    let from = item.status;

    if to == Status::Done {
        item.completed_at = Some(now);
        item.progress = 100.0;
    } else {
        item.completed_at = None;
    }

    if from.is_terminal() && to == Status::Todo {
        item.progress = 0.0;
    }

    if to == Status::Blocked {
        item.block_reason = reason;
    } else if from == Status::Blocked {
        item.block_reason = None;
    }

    item.status = to;
    item.updated_at = now;
}

/// The status a progress update implies, if any.
///
/// `p == 100` completes the item from any non-terminal status; a partial
/// value while still `Todo` auto-advances to `InProgress`. Both implied
/// transitions go through the same legality and gating checks as explicit
/// ones. The input must already be clamped to `[0, 100]`.
#[must_use]
pub fn progress_target(current: Status, clamped: f64) -> Option<Status> {
    if current.is_terminal() {
        return None;
    }
    if (clamped - 100.0).abs() < f64::EPSILON {
        return Some(Status::Done);
    }
    if clamped > 0.0 && current == Status::Todo {
        return Some(Status::InProgress);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{allowed, apply, check, progress_target, requires_gate};
    use crate::error::EngineError;
    use crate::model::item::{Status, WorkItem};
    use crate::model::item_id::ItemId;
    use chrono::Utc;

    const ALL: [Status; 9] = [
        Status::Todo,
        Status::InProgress,
        Status::InReview,
        Status::Testing,
        Status::Done,
        Status::Cancelled,
        Status::Blocked,
        Status::OnHold,
        Status::Closed,
    ];

    fn item_in(status: Status) -> WorkItem {
        let mut item = WorkItem::new(ItemId::new_unchecked("sn-t"), "t", Utc::now());
        item.status = status;
        if status == Status::Done {
            item.completed_at = Some(Utc::now());
            item.progress = 100.0;
        }
        item
    }

    #[test]
    fn self_transitions_are_never_allowed() {
        for status in ALL {
            assert!(!allowed(status, status), "{status} -> {status}");
        }
    }

    #[test]
    fn terminal_statuses_only_reopen() {
        for from in [Status::Cancelled, Status::Closed] {
            for to in ALL {
                assert_eq!(allowed(from, to), to == Status::Todo, "{from} -> {to}");
            }
        }
        for to in ALL {
            assert_eq!(
                allowed(Status::Done, to),
                matches!(to, Status::Todo | Status::Closed),
                "done -> {to}"
            );
        }
    }

    #[test]
    fn blocked_unblocks_to_todo_or_completes() {
        // unblock goes through todo; done stays reachable so a progress
        // update of 100 can complete a blocked item
        for to in ALL {
            assert_eq!(
                allowed(Status::Blocked, to),
                matches!(to, Status::Todo | Status::Done),
                "blocked -> {to}"
            );
        }
    }

    #[test]
    fn every_non_terminal_can_block_and_complete() {
        for from in [
            Status::Todo,
            Status::InProgress,
            Status::InReview,
            Status::Testing,
            Status::OnHold,
        ] {
            assert!(allowed(from, Status::Blocked), "{from} -> blocked");
            assert!(allowed(from, Status::Done), "{from} -> done");
        }
        assert!(allowed(Status::Blocked, Status::Done));
    }

    #[test]
    fn check_names_the_rejected_pair() {
        let item = item_in(Status::Done);
        let err = check(&item, Status::Testing).expect_err("illegal");
        match err {
            EngineError::IllegalTransition { from, to, .. } => {
                assert_eq!(from, Status::Done);
                assert_eq!(to, Status::Testing);
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn gate_applies_to_in_progress_and_done_only() {
        for status in ALL {
            assert_eq!(
                requires_gate(status),
                matches!(status, Status::InProgress | Status::Done),
                "{status}"
            );
        }
    }

    #[test]
    fn completing_stamps_and_fills_progress() {
        let mut item = item_in(Status::InProgress);
        item.progress = 40.0;
        let now = Utc::now();

        apply(&mut item, Status::Done, None, now);
        assert_eq!(item.status, Status::Done);
        assert_eq!(item.completed_at, Some(now));
        assert!((item.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reopen_clears_completion_and_progress() {
        let mut item = item_in(Status::Done);
        apply(&mut item, Status::Todo, None, Utc::now());

        assert_eq!(item.status, Status::Todo);
        assert!(item.completed_at.is_none());
        assert!(item.progress.abs() < f64::EPSILON);
    }

    #[test]
    fn closing_a_done_item_clears_completed_at() {
        // completed_at is set iff status == Done, so Closed drops it.
        let mut item = item_in(Status::Done);
        apply(&mut item, Status::Closed, None, Utc::now());
        assert!(item.completed_at.is_none());
        // progress is untouched by close
        assert!((item.progress - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn block_stashes_reason_and_unblock_clears_it() {
        let mut item = item_in(Status::InProgress);
        apply(
            &mut item,
            Status::Blocked,
            Some("waiting on vendor".to_string()),
            Utc::now(),
        );
        assert_eq!(item.block_reason.as_deref(), Some("waiting on vendor"));

        apply(&mut item, Status::Todo, None, Utc::now());
        assert!(item.block_reason.is_none());
        assert_eq!(item.status, Status::Todo);
    }

    #[test]
    fn progress_target_full_value_completes() {
        assert_eq!(progress_target(Status::Todo, 100.0), Some(Status::Done));
        assert_eq!(
            progress_target(Status::InProgress, 100.0),
            Some(Status::Done)
        );
        assert_eq!(progress_target(Status::Testing, 100.0), Some(Status::Done));
    }

    #[test]
    fn progress_target_partial_only_advances_todo() {
        assert_eq!(
            progress_target(Status::Todo, 25.0),
            Some(Status::InProgress)
        );
        assert_eq!(progress_target(Status::InProgress, 25.0), None);
        assert_eq!(progress_target(Status::InReview, 25.0), None);
        assert_eq!(progress_target(Status::Todo, 0.0), None);
    }

    #[test]
    fn progress_target_ignores_terminal_statuses() {
        assert_eq!(progress_target(Status::Done, 100.0), None);
        assert_eq!(progress_target(Status::Cancelled, 50.0), None);
        assert_eq!(progress_target(Status::Closed, 100.0), None);
    }
}
