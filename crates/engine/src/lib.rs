//! The mutation engine for the fiscus budget tracker: hierarchical rollups,
//! two-phase trash/restore/purge cascades, usage-counter maintenance, and the
//! append-only activity log, all fronted by [`service::BudgetService`].

pub mod cascade;
pub mod counters;
pub mod error;
pub mod recorder;
pub mod rollup;
pub mod service;

pub use counters::UsageDrift;
pub use error::{EngineError, ErrorEnvelope};
pub use recorder::ChainVerification;
pub use rollup::{RecalcOutcome, RecalcSummary};
pub use service::{
    AllocationUpdate, BatchOutcome, BudgetService, FundRecordUpdate, FundReportUpdate,
    LookupValidator, MutationReceipt, NewAllocation, NewFundRecord, NewFundReport, NewProject,
    NewReport, ProjectUpdate, ReportUpdate, SqlLookupValidator,
};
