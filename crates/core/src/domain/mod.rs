use serde::{Deserialize, Serialize};

pub mod activity;
pub mod actor;
pub mod allocation;
pub mod fund;
pub mod lookup;
pub mod project;
pub mod report;
pub mod status;

/// The five node kinds the engine mutates. Lookup code tables are addressed
/// separately through [`lookup::LookupKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Allocation,
    Project,
    Report,
    FundRecord,
    FundReport,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Project => "project",
            Self::Report => "report",
            Self::FundRecord => "fund_record",
            Self::FundReport => "fund_report",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "allocation" => Some(Self::Allocation),
            "project" => Some(Self::Project),
            "report" => Some(Self::Report),
            "fund_record" => Some(Self::FundRecord),
            "fund_report" => Some(Self::FundReport),
            _ => None,
        }
    }
}
