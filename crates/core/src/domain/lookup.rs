use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three shared code tables whose rows carry a usage counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Particular,
    Office,
    Category,
}

impl LookupKind {
    /// Table name; every lookup table shares one column layout.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Particular => "particulars",
            Self::Office => "offices",
            Self::Category => "categories",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Particular => "particular",
            Self::Office => "office",
            Self::Category => "category",
        }
    }
}

/// One row of a code table. `usage_count` is a cache of the number of live
/// (non-deleted) entities referencing `code`; it is only ever adjusted inside
/// the same transaction as the entity transition it mirrors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub code: String,
    pub name: String,
    pub active: bool,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
