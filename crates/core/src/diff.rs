//! Snapshot diffing and change flagging for the activity log.
//!
//! Every mutation captures a before/after JSON snapshot of the affected
//! entity. This module computes the changed-field list, collapses it into a
//! coarse [`ChangeSummary`], and applies the flagging heuristics that mark an
//! entry for reviewer attention.

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::activity::{ActivityAction, ChangeSummary};
use crate::domain::status::NodeStatus;

// ---------------------------------------------------------------------------
// Field classification
// ---------------------------------------------------------------------------

/// Bookkeeping columns that change on every write and carry no reviewer
/// signal. Excluded from diffs entirely.
const SYSTEM_FIELDS: &[&str] = &[
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "deleted_at",
    "deleted_by",
    "is_deleted",
];

/// Money figures, both entered and derived. A change to any of these sets
/// `budget_changed` and is a candidate for the swing rule.
const BUDGET_FIELDS: &[&str] = &[
    "total_allocated",
    "total_obligated",
    "total_utilized",
    "allocated_budget",
    "obligated_budget",
    "budget_utilized",
    "balance",
];

const DATE_FIELDS: &[&str] = &["report_date", "fiscal_year", "year"];

const LOCATION_FIELDS: &[&str] = &["region", "province", "city"];

/// Relative swing above which a budget edit is flagged: |new - old| / old
/// greater than 20 percent.
const SWING_THRESHOLD_PCT: i64 = 20;

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

/// List the fields whose values differ between the two snapshots, skipping
/// system fields. A missing snapshot is treated as an empty object, so a
/// creation lists every captured field and a purge lists none.
///
/// The result is sorted for stable persistence and comparison in tests.
pub fn diff_snapshots(before: Option<&Value>, after: Option<&Value>) -> Vec<String> {
    let before = object_fields(before);
    let after = object_fields(after);

    let mut names: BTreeSet<&str> = BTreeSet::new();
    if let Some(map) = before {
        names.extend(map.keys().map(String::as_str));
    }
    if let Some(map) = after {
        names.extend(map.keys().map(String::as_str));
    }

    names
        .into_iter()
        .filter(|name| !SYSTEM_FIELDS.contains(name))
        .filter(|name| {
            let old = before.and_then(|map| map.get(*name));
            let new = after.and_then(|map| map.get(*name));
            old != new
        })
        .map(str::to_owned)
        .collect()
}

fn object_fields(snapshot: Option<&Value>) -> Option<&serde_json::Map<String, Value>> {
    snapshot.and_then(Value::as_object)
}

/// Collapse a changed-field list into the four coarse booleans the activity
/// log stores alongside the full list.
pub fn summarize_changes(changed_fields: &[String]) -> ChangeSummary {
    let has = |fields: &[&str]| changed_fields.iter().any(|name| fields.contains(&name.as_str()));
    ChangeSummary {
        budget_changed: has(BUDGET_FIELDS),
        status_changed: changed_fields.iter().any(|name| name == "status"),
        date_changed: has(DATE_FIELDS),
        location_changed: has(LOCATION_FIELDS),
    }
}

// ---------------------------------------------------------------------------
// Flagging
// ---------------------------------------------------------------------------

/// Apply the flagging heuristics to one mutation. Returns the matched reasons;
/// an empty list means the entry is unflagged.
///
/// Rules:
/// - every deletion (trash or purge) is flagged;
/// - an update that moves a budget field by more than 20 percent of its
///   previous value is flagged (a previous value of zero counts as an
///   unbounded swing and always flags);
/// - an update whose status transitions into a terminal status is flagged.
pub fn evaluate_flags(
    action: ActivityAction,
    changed_fields: &[String],
    before: Option<&Value>,
    after: Option<&Value>,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if action.is_deletion() {
        reasons.push(match action {
            ActivityAction::Purged => "permanent deletion".to_owned(),
            _ => "deletion".to_owned(),
        });
    }

    if action == ActivityAction::Updated {
        for field in changed_fields {
            if !BUDGET_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let old = snapshot_decimal(before, field);
            let new = snapshot_decimal(after, field);
            if let (Some(old), Some(new)) = (old, new) {
                if swing_exceeds_threshold(old, new) {
                    reasons.push(format!(
                        "{field} moved more than {SWING_THRESHOLD_PCT}% (from {old} to {new})"
                    ));
                }
            }
        }

        if changed_fields.iter().any(|name| name == "status") {
            let old = snapshot_status(before);
            let new = snapshot_status(after);
            if let Some(new) = new {
                if new.is_terminal() && old.map_or(true, |old| !old.is_terminal()) {
                    reasons.push(format!("status moved to {}", new.as_str()));
                }
            }
        }
    }

    reasons
}

/// `|new - old| / old > threshold`, evaluated without division so exact
/// decimal comparison holds at the boundary. A zero previous value makes any
/// change an unbounded relative swing.
fn swing_exceeds_threshold(old: Decimal, new: Decimal) -> bool {
    if old.is_zero() {
        return new != old;
    }
    let delta = (new - old).abs();
    delta * Decimal::ONE_HUNDRED > Decimal::from(SWING_THRESHOLD_PCT) * old.abs()
}

fn snapshot_decimal(snapshot: Option<&Value>, field: &str) -> Option<Decimal> {
    match snapshot?.get(field)? {
        Value::String(raw) => Decimal::from_str(raw).ok(),
        Value::Number(raw) => Decimal::from_str(&raw.to_string()).ok(),
        _ => None,
    }
}

fn snapshot_status(snapshot: Option<&Value>) -> Option<NodeStatus> {
    let raw = snapshot?.get("status")?.as_str()?;
    Some(NodeStatus::parse(raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn diff_lists_changed_fields_and_skips_system_columns() {
        let before = json!({
            "title": "Farm to Market Road",
            "total_obligated": "15000",
            "status": "ongoing",
            "updated_at": "2026-01-01T00:00:00Z",
            "updated_by": "e-1",
        });
        let after = json!({
            "title": "Farm to Market Road",
            "total_obligated": "40000",
            "status": "completed",
            "updated_at": "2026-02-01T00:00:00Z",
            "updated_by": "e-2",
        });

        let changed = diff_snapshots(Some(&before), Some(&after));

        assert_eq!(changed, vec!["status".to_owned(), "total_obligated".to_owned()]);
    }

    #[test]
    fn diff_against_missing_before_lists_every_captured_field() {
        let after = json!({"title": "New project", "status": "ongoing", "created_at": "x"});
        let changed = diff_snapshots(None, Some(&after));
        assert_eq!(changed, vec!["status".to_owned(), "title".to_owned()]);
    }

    #[test]
    fn diff_picks_up_fields_dropped_in_the_after_snapshot() {
        let before = json!({"region": "IV-A", "status": "ongoing"});
        let after = json!({"status": "ongoing"});
        let changed = diff_snapshots(Some(&before), Some(&after));
        assert_eq!(changed, vec!["region".to_owned()]);
    }

    #[test]
    fn summary_classifies_budget_date_location_and_status() {
        let changed = vec![
            "budget_utilized".to_owned(),
            "report_date".to_owned(),
            "city".to_owned(),
            "status".to_owned(),
        ];
        let summary = summarize_changes(&changed);
        assert!(summary.budget_changed);
        assert!(summary.status_changed);
        assert!(summary.date_changed);
        assert!(summary.location_changed);
    }

    #[test]
    fn summary_of_title_only_change_is_all_clear() {
        let summary = summarize_changes(&["title".to_owned()]);
        assert_eq!(summary, ChangeSummary::default());
    }

    #[test]
    fn every_deletion_is_flagged() {
        let trashed = evaluate_flags(ActivityAction::Trashed, &[], None, None);
        let purged = evaluate_flags(ActivityAction::Purged, &[], None, None);
        assert_eq!(trashed, vec!["deletion".to_owned()]);
        assert_eq!(purged, vec!["permanent deletion".to_owned()]);
    }

    #[test]
    fn restore_and_create_are_not_flagged() {
        assert!(evaluate_flags(ActivityAction::Restored, &[], None, None).is_empty());
        let after = json!({"total_allocated": "100000"});
        let changed = vec!["total_allocated".to_owned()];
        assert!(evaluate_flags(ActivityAction::Created, &changed, None, Some(&after)).is_empty());
    }

    #[test]
    fn swing_above_twenty_percent_is_flagged() {
        let before = json!({"total_obligated": "10000"});
        let after = json!({"total_obligated": "12001"});
        let changed = vec!["total_obligated".to_owned()];

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("total_obligated"));
    }

    #[test]
    fn swing_of_exactly_twenty_percent_is_not_flagged() {
        let before = json!({"total_obligated": "10000"});
        let after = json!({"total_obligated": "12000"});
        let changed = vec!["total_obligated".to_owned()];

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert!(reasons.is_empty());
    }

    #[test]
    fn any_change_away_from_zero_is_an_unbounded_swing() {
        let before = json!({"budget_utilized": "0"});
        let after = json!({"budget_utilized": "1"});
        let changed = vec!["budget_utilized".to_owned()];

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert_eq!(reasons.len(), 1);
    }

    #[test]
    fn transition_into_completed_is_flagged_once() {
        let before = json!({"status": "ongoing"});
        let after = json!({"status": "completed"});
        let changed = vec!["status".to_owned()];

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert_eq!(reasons, vec!["status moved to completed".to_owned()]);
    }

    #[test]
    fn completed_to_completed_is_not_a_transition() {
        let before = json!({"status": "completed", "title": "a"});
        let after = json!({"status": "completed", "title": "b"});
        let changed = diff_snapshots(Some(&before), Some(&after));

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert!(reasons.is_empty());
    }

    #[test]
    fn budget_swing_and_terminal_status_can_both_flag_one_entry() {
        let before = json!({"total_obligated": "1000", "status": "delayed"});
        let after = json!({"total_obligated": "5000", "status": "completed"});
        let changed = diff_snapshots(Some(&before), Some(&after));

        let reasons =
            evaluate_flags(ActivityAction::Updated, &changed, Some(&before), Some(&after));

        assert_eq!(reasons.len(), 2);
    }
}
