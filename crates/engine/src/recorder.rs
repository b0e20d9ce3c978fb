//! The activity recorder: one immutable audit entry per mutation.
//!
//! Each entry captures the actor snapshot, the before/after diff, the coarse
//! change summary, and the flagging verdict, and is linked into a per-entity
//! SHA-256 hash chain so tampering with historical rows is detectable.
//! Bulk operations produce one entry per affected entity under a shared
//! batch id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use fiscus_core::diff::{diff_snapshots, evaluate_flags, summarize_changes};
use fiscus_core::domain::activity::{ActivityAction, ActivityRecord};
use fiscus_core::domain::actor::Actor;
use fiscus_core::domain::EntityKind;
use fiscus_db::store::activity;

use crate::error::EngineError;

/// What the recorder needs to know about one mutation.
#[derive(Debug)]
pub struct Mutation<'a> {
    pub actor: &'a Actor,
    pub action: ActivityAction,
    pub entity_kind: EntityKind,
    pub entity_id: &'a str,
    pub batch_id: Option<&'a str>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Build and append the audit entry for one mutation. Must be called inside
/// the same transaction as the mutation it describes.
pub async fn record(
    conn: &mut SqliteConnection,
    mutation: Mutation<'_>,
    recorded_at: DateTime<Utc>,
) -> Result<ActivityRecord, EngineError> {
    let changed_fields = diff_snapshots(mutation.before.as_ref(), mutation.after.as_ref());
    let summary = summarize_changes(&changed_fields);
    let flag_reasons = evaluate_flags(
        mutation.action,
        &changed_fields,
        mutation.before.as_ref(),
        mutation.after.as_ref(),
    );

    let prev_hash =
        activity::last_entry_hash(conn, mutation.entity_kind, mutation.entity_id).await?;
    let entry_hash = entry_hash(
        prev_hash.as_deref(),
        mutation.entity_kind,
        mutation.entity_id,
        mutation.action,
        &mutation.actor.id,
        recorded_at,
        mutation.before.as_ref(),
        mutation.after.as_ref(),
    );

    let record = ActivityRecord {
        id: Uuid::new_v4().to_string(),
        actor: mutation.actor.clone(),
        action: mutation.action,
        entity_kind: mutation.entity_kind,
        entity_id: mutation.entity_id.to_string(),
        batch_id: mutation.batch_id.map(str::to_owned),
        before: mutation.before,
        after: mutation.after,
        changed_fields,
        summary,
        flagged: !flag_reasons.is_empty(),
        flag_reasons,
        prev_hash,
        entry_hash,
        recorded_at,
    };

    activity::append(conn, &record).await?;
    debug!(
        event_name = "activity.recorded",
        entity_kind = record.entity_kind.as_str(),
        entity_id = %record.entity_id,
        action = record.action.as_str(),
        flagged = record.flagged,
    );

    Ok(record)
}

/// Outcome of walking one entity's hash chain.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ChainVerification {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub valid: bool,
    pub verified_entries: usize,
    pub latest_hash: Option<String>,
    pub failure_reason: Option<String>,
}

/// Re-derive every entry hash in one entity's chain and check the links.
/// Reports the first break; an empty chain is valid (nothing to tamper with).
pub async fn verify_log(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: &str,
) -> Result<ChainVerification, EngineError> {
    let entries = activity::chain(conn, entity_kind, entity_id).await?;

    let mut previous_hash: Option<String> = None;
    for (index, entry) in entries.iter().enumerate() {
        if entry.prev_hash != previous_hash {
            return Ok(ChainVerification {
                entity_kind,
                entity_id: entity_id.to_string(),
                valid: false,
                verified_entries: index,
                latest_hash: previous_hash,
                failure_reason: Some(format!("previous-hash mismatch at entry {}", entry.id)),
            });
        }

        let expected = entry_hash(
            entry.prev_hash.as_deref(),
            entry.entity_kind,
            &entry.entity_id,
            entry.action,
            &entry.actor.id,
            entry.recorded_at,
            entry.before.as_ref(),
            entry.after.as_ref(),
        );
        if expected != entry.entry_hash {
            return Ok(ChainVerification {
                entity_kind,
                entity_id: entity_id.to_string(),
                valid: false,
                verified_entries: index,
                latest_hash: previous_hash,
                failure_reason: Some(format!("entry hash mismatch at entry {}", entry.id)),
            });
        }

        previous_hash = Some(entry.entry_hash.clone());
    }

    Ok(ChainVerification {
        entity_kind,
        entity_id: entity_id.to_string(),
        valid: true,
        verified_entries: entries.len(),
        latest_hash: previous_hash,
        failure_reason: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn entry_hash(
    prev_hash: Option<&str>,
    entity_kind: EntityKind,
    entity_id: &str,
    action: ActivityAction,
    actor_id: &str,
    recorded_at: DateTime<Utc>,
    before: Option<&Value>,
    after: Option<&Value>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("genesis").as_bytes());
    hasher.update(b"\n");
    hasher.update(entity_kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(entity_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(action.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(actor_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(recorded_at.to_rfc3339().as_bytes());
    hasher.update(b"\n");
    hasher.update(before.map(Value::to_string).unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    hasher.update(after.map(Value::to_string).unwrap_or_default().as_bytes());

    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}
