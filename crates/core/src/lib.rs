pub mod config;
pub mod diff;
pub mod domain;
pub mod errors;
pub mod rollup;

pub use diff::{diff_snapshots, evaluate_flags, summarize_changes};
pub use domain::activity::{ActivityAction, ActivityRecord, ChangeSummary};
pub use domain::actor::Actor;
pub use domain::allocation::{Allocation, AllocationId};
pub use domain::fund::{FundRecord, FundRecordId, FundReport, FundReportId};
pub use domain::lookup::{LookupEntry, LookupKind};
pub use domain::project::{Project, ProjectId};
pub use domain::report::{Report, ReportId};
pub use domain::status::NodeStatus;
pub use domain::EntityKind;
pub use errors::DomainError;
pub use rollup::{derive_metrics, ChildSummary, DerivedMetrics, StatusCounts, UtilizedSource};
