//! Preview (reconciliation) models and approval DTOs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::destination::DestinationTable;

/// Preview lifecycle. Resolved previews are never re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl PreviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Persisted anchor of a preview; the comparison itself is derived on read.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPreview {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub job_id: Uuid,
    pub declared_table: Option<String>,
    pub confidence: f64,
    pub status: PreviewStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-field change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// No current value exists
    New,
    /// Differs from the current value and can be accepted without confirmation
    Modified,
    /// Differs and needs human confirmation (low confidence or sensitive field)
    Conflict,
    /// Same as the current value
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FieldComparison {
    pub staging_item_id: Uuid,
    pub field_name: String,
    pub extracted_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    pub confidence: f64,
    pub source_snippet: String,
    pub change: ChangeKind,
    /// Excluded by accept-non-conflicting unless edited
    pub needs_confirmation: bool,
}

/// One element of a repeating list, always presented as a new row.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RowComparison {
    pub staging_item_id: Uuid,
    pub list: String,
    pub row_index: i32,
    #[schema(value_type = Object)]
    pub values: JsonValue,
    pub confidence: f64,
    pub source_snippet: String,
    pub change: ChangeKind,
    pub needs_confirmation: bool,
}

impl RowComparison {
    /// Edit key addressing this row, e.g. `conditions[2]`.
    pub fn edit_key(&self) -> String {
        row_edit_key(&self.list, self.row_index)
    }
}

pub fn row_edit_key(list: &str, row_index: i32) -> String {
    format!("{list}[{row_index}]")
}

/// Editable comparison set returned to the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ComparisonSet {
    pub preview_id: Uuid,
    pub file_id: Uuid,
    pub job_id: Uuid,
    pub declared_table: Option<String>,
    pub confidence: f64,
    pub status: PreviewStatus,
    /// Natural key of the existing record the fields were compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_record: Option<String>,
    pub fields: Vec<FieldComparison>,
    pub rows: Vec<RowComparison>,
}

impl ComparisonSet {
    pub fn conflict_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.change == ChangeKind::Conflict)
            .count()
    }
}

/// Preview listing entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewSummary {
    pub id: Uuid,
    pub job_id: Uuid,
    pub declared_table: Option<String>,
    pub confidence: f64,
    pub status: PreviewStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&ExtractionPreview> for PreviewSummary {
    fn from(p: &ExtractionPreview) -> Self {
        Self {
            id: p.id,
            job_id: p.job_id,
            declared_table: p.declared_table.clone(),
            confidence: p.confidence,
            status: p.status,
            created_at: p.created_at,
        }
    }
}

/// How the reviewer accepts the comparison set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    #[default]
    AcceptAll,
    AcceptNonConflicting,
}

/// Approval request body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApproveRequest {
    /// Field name (or `list[index]` for a whole row) to replacement value
    #[schema(value_type = Option<Object>)]
    pub edited_data: Option<BTreeMap<String, JsonValue>>,
    pub approval_notes: Option<String>,
    pub mode: Option<ApprovalMode>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApproveResponse {
    pub success: bool,
    pub records_inserted: u64,
    pub records_filtered: u64,
    pub target_table: DestinationTable,
    pub declared_table: Option<String>,
    pub processing_time_seconds: f64,
    pub edited_fields_count: u32,
    pub audit_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RejectResponse {
    pub success: bool,
    pub preview_id: Uuid,
    pub items_rejected: u64,
    pub audit_id: Uuid,
}
