//! Approval audit models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Approved,
    Edited,
    Rejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Edited => "edited",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "edited" => Some(Self::Edited),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Audit entry to be written alongside an approval decision.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub tenant_id: Uuid,
    pub preview_id: Uuid,
    pub file_id: Uuid,
    pub approved_by: String,
    pub action: AuditAction,
    pub original_payload: JsonValue,
    pub edited_payload: Option<JsonValue>,
    pub edited_fields_count: i32,
    pub confidence: f64,
    pub declared_table: Option<String>,
    pub target_table: Option<String>,
    pub records_written: i64,
    pub records_filtered: i64,
    pub notes: Option<String>,
    pub processing_ms: i64,
}

/// Immutable record of what a human authorized.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ApprovalAuditEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub preview_id: Uuid,
    pub file_id: Uuid,
    pub approved_by: String,
    pub action: AuditAction,
    #[schema(value_type = Object)]
    pub original_payload: JsonValue,
    #[schema(value_type = Option<Object>)]
    pub edited_payload: Option<JsonValue>,
    pub edited_fields_count: i32,
    pub confidence: f64,
    pub declared_table: Option<String>,
    pub target_table: Option<String>,
    pub records_written: i64,
    pub records_filtered: i64,
    pub notes: Option<String>,
    pub processing_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl ApprovalAuditEntry {
    pub fn from_new(id: Uuid, entry: NewAuditEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            tenant_id: entry.tenant_id,
            preview_id: entry.preview_id,
            file_id: entry.file_id,
            approved_by: entry.approved_by,
            action: entry.action,
            original_payload: entry.original_payload,
            edited_payload: entry.edited_payload,
            edited_fields_count: entry.edited_fields_count,
            confidence: entry.confidence,
            declared_table: entry.declared_table,
            target_table: entry.target_table,
            records_written: entry.records_written,
            records_filtered: entry.records_filtered,
            notes: entry.notes,
            processing_ms: entry.processing_ms,
            created_at,
        }
    }
}

/// Audit listing filters.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct AuditQuery {
    pub file_id: Option<Uuid>,
    pub preview_id: Option<Uuid>,
}
