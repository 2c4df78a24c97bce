//! Extraction job, staging item and status polling models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Outcome recorded on an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Passed the quality gate and was promoted to staging.
    Completed,
    /// Model output broke the contract; kept for forensics only.
    SchemaViolation,
    /// The attempt never produced output: download or AI service failure.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SchemaViolation => "schema_violation",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "schema_violation" => Some(Self::SchemaViolation),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Human review status of a staging item.
///
/// One-way: `pending → approved | rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
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

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Apply a review decision. Terminal statuses never change.
    pub fn transition(self, to: ReviewStatus) -> ReviewStatus {
        if self.is_terminal() { self } else { to }
    }
}

/// One extraction attempt against a file. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub attempt: i32,
    pub model: String,
    pub status: JobStatus,
    pub quality_score: Option<f64>,
    pub evidence_chars: Option<i32>,
    pub declared_table: Option<String>,
    pub raw_result: JsonValue,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Staging row to be written with its job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStagingItem {
    /// Position in a repeating list (`conditions`, `line_items`); None for scalars
    pub row_index: Option<i32>,
    pub field_name: String,
    pub extracted_value: String,
    pub source_snippet: String,
    pub confidence: f64,
}

/// Candidate field or row awaiting human review.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StagingItem {
    pub id: Uuid,
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<i32>,
    pub field_name: String,
    pub extracted_value: String,
    pub source_snippet: String,
    pub confidence: f64,
    pub review_status: ReviewStatus,
}

impl StagingItem {
    pub fn is_row(&self) -> bool {
        self.row_index.is_some()
    }
}

/// Immutable operational log outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Accepted,
    QualityGateFailed,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::QualityGateFailed => "quality_gate_failed",
        }
    }
}

/// Operational log row recording the evidence behind an extraction decision.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExtractionLog {
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub job_id: Option<Uuid>,
    pub outcome: LogOutcome,
    pub confidence: f64,
    pub evidence_chars: i32,
    pub model: String,
}

/// Extraction invocation request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtractRequest {
    pub file_id: Uuid,
}

/// Successful extraction invocation response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExtractResponse {
    pub ok: bool,
    pub extraction_id: Uuid,
    pub preview_id: Uuid,
    pub confidence: f64,
    pub evidence_chars: i32,
    pub items_count: usize,
}

/// Status poll query parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusQuery {
    pub job_id: Option<Uuid>,
}

/// Discriminated extraction status returned by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Queued,
    Processing {
        progress: u8,
        message: String,
    },
    Completed {
        extraction_id: Uuid,
        items_count: u64,
        quality_score: f64,
    },
    Failed {
        message: String,
    },
}

impl ExtractionStatus {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
