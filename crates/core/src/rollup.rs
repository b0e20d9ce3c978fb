use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::status::NodeStatus;

/// What a parent's rollup sees of one live child, regardless of tier: a
/// project summarizes its derived totals, a report its raw figures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub obligated: Decimal,
    pub utilized: Decimal,
    pub status: NodeStatus,
}

/// Per-node strategy for the utilized figure. Selected by the caller from the
/// node's `auto_calculate_utilized` flag; the calculator itself never
/// inspects the flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UtilizedSource {
    /// Sum the live children's utilized figures.
    Computed,
    /// Pass the manually entered figure through untouched.
    Manual(Decimal),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ongoing: usize,
    pub delayed: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn tally(children: &[ChildSummary]) -> Self {
        let mut counts = Self::default();
        for child in children {
            match child.status {
                NodeStatus::Ongoing => counts.ongoing += 1,
                NodeStatus::Delayed => counts.delayed += 1,
                NodeStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }
}

/// Everything `derive_metrics` computes for one parent node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub obligated: Decimal,
    pub utilized: Decimal,
    pub rate: Decimal,
    pub status: NodeStatus,
    pub status_counts: StatusCounts,
}

/// Derive one parent node's rollup fields from its live children.
///
/// - `obligated` is always the sum of the children's obligated figures,
///   independent of the utilized strategy.
/// - `utilized` follows the [`UtilizedSource`]: summed when `Computed`,
///   passed through untouched when `Manual`.
/// - `rate` is `utilized / allocated * 100` when `allocated > 0`, else zero.
///   It is deliberately unclamped; over-utilization (> 100) is valid data
///   that callers surface as a warning.
/// - `status` of an empty child set is `Ongoing`; otherwise a strict
///   priority cascade: any ongoing child wins, then any delayed child, and
///   only an all-completed set completes the parent.
///
/// Deterministic and side-effect-free.
pub fn derive_metrics(
    children: &[ChildSummary],
    allocated: Decimal,
    source: UtilizedSource,
) -> DerivedMetrics {
    let obligated: Decimal = children.iter().map(|child| child.obligated).sum();
    let utilized = match source {
        UtilizedSource::Computed => children.iter().map(|child| child.utilized).sum(),
        UtilizedSource::Manual(value) => value,
    };
    let status_counts = StatusCounts::tally(children);

    DerivedMetrics {
        obligated,
        utilized,
        rate: utilization_rate(utilized, allocated),
        status: derive_status(children.len(), &status_counts),
        status_counts,
    }
}

pub fn utilization_rate(utilized: Decimal, allocated: Decimal) -> Decimal {
    if allocated > Decimal::ZERO {
        utilized / allocated * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    }
}

fn derive_status(child_count: usize, counts: &StatusCounts) -> NodeStatus {
    if child_count == 0 {
        NodeStatus::Ongoing
    } else if counts.ongoing > 0 {
        NodeStatus::Ongoing
    } else if counts.delayed > 0 {
        NodeStatus::Delayed
    } else {
        NodeStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::{derive_metrics, ChildSummary, DerivedMetrics, UtilizedSource};
    use crate::domain::status::NodeStatus;

    fn child(obligated: i64, utilized: i64, status: NodeStatus) -> ChildSummary {
        ChildSummary {
            obligated: Decimal::from(obligated),
            utilized: Decimal::from(utilized),
            status,
        }
    }

    #[test]
    fn sums_children_when_auto_calculated() {
        let children = [
            child(15_000, 20_000, NodeStatus::Ongoing),
            child(25_000, 30_000, NodeStatus::Completed),
        ];

        let metrics =
            derive_metrics(&children, Decimal::from(100_000), UtilizedSource::Computed);

        assert_eq!(metrics.obligated, Decimal::from(40_000));
        assert_eq!(metrics.utilized, Decimal::from(50_000));
        assert_eq!(metrics.rate, Decimal::from(50));
        assert_eq!(metrics.status, NodeStatus::Ongoing);
    }

    #[test]
    fn manual_source_passes_utilized_through_but_still_sums_obligated() {
        let children = [
            child(15_000, 20_000, NodeStatus::Completed),
            child(25_000, 30_000, NodeStatus::Completed),
        ];

        let metrics = derive_metrics(
            &children,
            Decimal::from(100_000),
            UtilizedSource::Manual(Decimal::from(70_000)),
        );

        assert_eq!(metrics.obligated, Decimal::from(40_000), "obligated ignores the manual flag");
        assert_eq!(metrics.utilized, Decimal::from(70_000));
        assert_eq!(metrics.rate, Decimal::from(70));
    }

    #[test]
    fn rate_is_zero_when_nothing_allocated() {
        let metrics = derive_metrics(
            &[child(10, 500, NodeStatus::Ongoing)],
            Decimal::ZERO,
            UtilizedSource::Computed,
        );
        assert_eq!(metrics.rate, Decimal::ZERO);
    }

    #[test]
    fn rate_is_not_clamped_at_one_hundred() {
        let metrics = derive_metrics(
            &[child(0, 150_000, NodeStatus::Ongoing)],
            Decimal::from(100_000),
            UtilizedSource::Computed,
        );
        assert_eq!(metrics.rate, Decimal::from(150));
    }

    #[test]
    fn status_priority_single_ongoing_child_wins() {
        let children = [
            child(0, 0, NodeStatus::Ongoing),
            child(0, 0, NodeStatus::Completed),
            child(0, 0, NodeStatus::Completed),
        ];
        let metrics = derive_metrics(&children, Decimal::ONE, UtilizedSource::Computed);
        assert_eq!(metrics.status, NodeStatus::Ongoing);
        assert_eq!(metrics.status_counts.ongoing, 1);
        assert_eq!(metrics.status_counts.completed, 2);
    }

    #[test]
    fn status_priority_delayed_beats_completed() {
        let children = [child(0, 0, NodeStatus::Delayed), child(0, 0, NodeStatus::Completed)];
        let metrics = derive_metrics(&children, Decimal::ONE, UtilizedSource::Computed);
        assert_eq!(metrics.status, NodeStatus::Delayed);
    }

    #[test]
    fn status_all_completed_completes_the_parent() {
        let children = [child(0, 0, NodeStatus::Completed), child(0, 0, NodeStatus::Completed)];
        let metrics = derive_metrics(&children, Decimal::ONE, UtilizedSource::Computed);
        assert_eq!(metrics.status, NodeStatus::Completed);
    }

    #[test]
    fn empty_child_set_defaults_to_ongoing() {
        let metrics = derive_metrics(&[], Decimal::from(5_000), UtilizedSource::Computed);
        assert_eq!(metrics.status, NodeStatus::Ongoing);
        assert_eq!(metrics.obligated, Decimal::ZERO);
        assert_eq!(metrics.utilized, Decimal::ZERO);
        assert_eq!(metrics.rate, Decimal::ZERO);
    }

    fn any_status() -> impl Strategy<Value = NodeStatus> {
        prop_oneof![
            Just(NodeStatus::Ongoing),
            Just(NodeStatus::Delayed),
            Just(NodeStatus::Completed),
        ]
    }

    fn any_child() -> impl Strategy<Value = ChildSummary> {
        (0i64..1_000_000_000, 0i64..1_000_000_000, any_status()).prop_map(
            |(obligated, utilized, status)| ChildSummary {
                obligated: Decimal::new(obligated, 2),
                utilized: Decimal::new(utilized, 2),
                status,
            },
        )
    }

    fn any_children() -> impl Strategy<Value = Vec<ChildSummary>> {
        prop::collection::vec(any_child(), 0..12)
    }

    proptest! {
        #[test]
        fn property_obligated_is_child_sum_under_every_source(
            children in any_children(),
            allocated in 0i64..1_000_000_000,
            manual in 0i64..1_000_000_000,
        ) {
            let allocated = Decimal::new(allocated, 2);
            let expected: Decimal = children.iter().map(|child| child.obligated).sum();

            let computed = derive_metrics(&children, allocated, UtilizedSource::Computed);
            let manual = derive_metrics(
                &children,
                allocated,
                UtilizedSource::Manual(Decimal::new(manual, 2)),
            );

            prop_assert_eq!(computed.obligated, expected);
            prop_assert_eq!(manual.obligated, expected);
        }

        #[test]
        fn property_manual_value_survives_untouched(
            children in any_children(),
            allocated in 1i64..1_000_000_000,
            manual in 0i64..1_000_000_000,
        ) {
            let manual = Decimal::new(manual, 2);
            let metrics =
                derive_metrics(&children, Decimal::new(allocated, 2), UtilizedSource::Manual(manual));
            prop_assert_eq!(metrics.utilized, manual);
        }

        #[test]
        fn property_rate_matches_formula(
            children in any_children(),
            allocated in 0i64..1_000_000_000,
        ) {
            let allocated = Decimal::new(allocated, 2);
            let metrics = derive_metrics(&children, allocated, UtilizedSource::Computed);

            if allocated > Decimal::ZERO {
                prop_assert_eq!(
                    metrics.rate,
                    metrics.utilized / allocated * Decimal::ONE_HUNDRED
                );
            } else {
                prop_assert_eq!(metrics.rate, Decimal::ZERO);
            }
        }

        #[test]
        fn property_status_ignores_child_order(
            children in any_children(),
            rotation in 0usize..12,
        ) {
            let baseline = derive_metrics(&children, Decimal::ONE, UtilizedSource::Computed);

            let mut rotated = children.clone();
            if !rotated.is_empty() {
                let len = rotated.len();
                rotated.rotate_left(rotation % len);
            }
            let shuffled = derive_metrics(&rotated, Decimal::ONE, UtilizedSource::Computed);

            prop_assert_eq!(baseline.status, shuffled.status);
            prop_assert_eq!(baseline.obligated, shuffled.obligated);
            prop_assert_eq!(baseline.status_counts, shuffled.status_counts);
        }

        #[test]
        fn property_recomputation_is_idempotent(
            children in any_children(),
            allocated in 0i64..1_000_000_000,
        ) {
            let allocated = Decimal::new(allocated, 2);
            let first = derive_metrics(&children, allocated, UtilizedSource::Computed);
            let second: DerivedMetrics =
                derive_metrics(&children, allocated, UtilizedSource::Computed);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn property_any_ongoing_child_forces_ongoing_parent(
            children in any_children(),
        ) {
            let metrics = derive_metrics(&children, Decimal::ONE, UtilizedSource::Computed);
            if children.iter().any(|child| child.status == NodeStatus::Ongoing) {
                prop_assert_eq!(metrics.status, NodeStatus::Ongoing);
            } else if children.iter().any(|child| child.status == NodeStatus::Delayed) {
                prop_assert_eq!(metrics.status, NodeStatus::Delayed);
            } else if !children.is_empty() {
                prop_assert_eq!(metrics.status, NodeStatus::Completed);
            }
        }
    }
}
