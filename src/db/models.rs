use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operation::{OpParams, OpType};

// ─── Read models (database rows) ─────────────────────────────────────────────
//
// Each struct maps 1-to-1 to a database table row. `sqlx::FromRow` is derived
// so sqlx can hydrate them directly from query results without manual
// mapping. Timestamp columns are `TIMESTAMPTZ` and map to `DateTime<Utc>` via
// sqlx's chrono integration.

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub id: Uuid,
    pub owner: String,
    pub original_path: String,
    pub size_bytes: i64,
    pub mime: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevisionRow {
    pub id: Uuid,
    pub image_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub op_type: i16,
    pub op_params: serde_json::Value,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub tombstoned_at: Option<DateTime<Utc>>,
}

impl RevisionRow {
    /// Decodes the stored `op_type` tag and JSON `op_params` back into a
    /// structured `(OpType, OpParams)` pair. Persisted rows are assumed
    /// valid — a decode failure here indicates on-disk corruption, not a
    /// client-facing error, so it panics rather than returning `ProtocolError`
    /// (spec.md §7's "internal panic when decoding our own persisted bytes"
    /// rule, mirrored here for the structured form).
    pub fn op_type(&self) -> OpType {
        OpType::from_tag(self.op_type as u16)
            .unwrap_or_else(|| panic!("corrupted op_type tag {} on revision {}", self.op_type, self.id))
    }

    pub fn op_params(&self) -> OpParams {
        serde_json::from_value(self.op_params.clone())
            .unwrap_or_else(|e| panic!("corrupted op_params on revision {}: {e}", self.id))
    }
}

/// A revision as returned to callers: the tombstone column is collapsed into
/// a plain bool since external consumers only ever care whether a revision is
/// currently active, never the timestamp it was retired at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: Uuid,
    pub image_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub op_type: OpType,
    pub op_params: OpParams,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub tombstoned: bool,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        let op_type = row.op_type();
        let op_params = row.op_params();
        Revision {
            id: row.id,
            image_id: row.image_id,
            parent_id: row.parent_id,
            op_type,
            op_params,
            storage_path: row.storage_path,
            created_at: row.created_at,
            tombstoned: row.tombstoned_at.is_some(),
        }
    }
}

// ─── Output / wire models ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ImageMetadata {
    pub id: Uuid,
    pub owner: String,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: i64,
    pub mime: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}
