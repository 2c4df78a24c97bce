//! Persistence seam used by the pipeline services.
//!
//! `DbPool` is the production implementation; `MemoryStore` backs tests and
//! local runs without PostgreSQL.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ApprovalAuditEntry, AuditQuery, DestinationRecord, DestinationTable, ExtractionJob,
    ExtractionPreview, JobStatus, NewAuditEntry, NewExtractionLog, NewStagingItem, PaginationParams,
    StagingItem, UploadedFile,
};

use super::DbPool;

/// A completed extraction promoted to staging in one transaction.
#[derive(Debug, Clone)]
pub struct NewExtraction {
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub attempt: i32,
    pub model: String,
    pub quality_score: f64,
    pub evidence_chars: i32,
    pub declared_table: Option<String>,
    pub raw_result: JsonValue,
    pub items: Vec<NewStagingItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedExtraction {
    pub job_id: Uuid,
    pub preview_id: Uuid,
    pub items_count: usize,
}

/// Job row of an attempt that ended without staging anything.
///
/// `SchemaViolation` keeps the model output for forensics; `Failed` covers
/// download and AI service errors, where there is no output.
#[derive(Debug, Clone)]
pub struct NewFailedJob {
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub attempt: i32,
    pub model: String,
    pub status: JobStatus,
    pub raw_output: Option<String>,
    pub error_message: String,
}

/// Everything an approval writes, committed atomically.
#[derive(Debug, Clone)]
pub struct ApprovalCommit {
    pub tenant_id: Uuid,
    pub preview_id: Uuid,
    pub file_id: Uuid,
    pub records: Vec<DestinationRecord>,
    pub approved_items: Vec<Uuid>,
    pub rejected_items: Vec<Uuid>,
    /// `records_written` / `records_filtered` are finalized by the store from
    /// the rows actually inserted.
    ///
    /// A generated tracking number already held by another file's entry is
    /// reissued inside the commit instead of being counted as a duplicate.
    pub audit: NewAuditEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub audit_id: Uuid,
    pub records_inserted: u64,
    pub records_filtered: u64,
}

#[derive(Debug, Clone)]
pub struct RejectionCommit {
    pub tenant_id: Uuid,
    pub preview_id: Uuid,
    pub job_id: Uuid,
    pub audit: NewAuditEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionOutcome {
    pub audit_id: Uuid,
    pub items_rejected: u64,
}

/// Tenant-scoped persistence operations of the pipeline.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    async fn insert_file(&self, file: &UploadedFile) -> AppResult<()>;

    async fn get_file(&self, tenant_id: Uuid, file_id: Uuid) -> AppResult<Option<UploadedFile>>;

    /// Compare-and-set a file into `parsed` for a new attempt.
    ///
    /// Returns `None` when the file is missing or an attempt is already in flight.
    async fn begin_attempt(&self, tenant_id: Uuid, file_id: Uuid)
    -> AppResult<Option<UploadedFile>>;

    /// Raise progress of an in-flight attempt. Lower values are ignored.
    async fn advance_progress(
        &self,
        file_id: Uuid,
        attempt: i32,
        progress: i16,
        message: &str,
    ) -> AppResult<bool>;

    /// Fail every attempt left in `parsed` since before `cutoff`.
    async fn fail_stale_attempts(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64>;

    async fn record_extraction(&self, extraction: NewExtraction) -> AppResult<RecordedExtraction>;

    /// Append a failed job and fail the file. Returns the job id.
    async fn record_failed_job(&self, job: NewFailedJob) -> AppResult<Uuid>;

    /// Log a quality gate rejection and fail the file. No job is written.
    async fn record_gate_failure(
        &self,
        log: NewExtractionLog,
        attempt: i32,
        message: &str,
    ) -> AppResult<()>;

    async fn get_job(&self, tenant_id: Uuid, job_id: Uuid) -> AppResult<Option<ExtractionJob>>;

    async fn latest_completed_job(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<ExtractionJob>>;

    async fn count_staging_items(&self, job_id: Uuid) -> AppResult<u64>;

    async fn staging_items_for_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> AppResult<Vec<StagingItem>>;

    async fn get_preview(
        &self,
        tenant_id: Uuid,
        preview_id: Uuid,
    ) -> AppResult<Option<ExtractionPreview>>;

    async fn previews_for_file(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Vec<ExtractionPreview>>;

    /// Subset of `keys` that already exist for the tenant in `table`.
    async fn existing_natural_keys(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        keys: &[String],
    ) -> AppResult<HashSet<String>>;

    /// Source file of each waste entry holding one of `numbers`.
    async fn tracking_number_sources(
        &self,
        tenant_id: Uuid,
        numbers: &[String],
    ) -> AppResult<HashMap<String, Option<Uuid>>>;

    /// Current values of the record identified by `natural_key`, keyed by field name.
    async fn find_current_record(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        natural_key: &str,
    ) -> AppResult<Option<BTreeMap<String, String>>>;

    async fn commit_approval(&self, commit: ApprovalCommit) -> AppResult<ApprovalOutcome>;

    async fn commit_rejection(&self, commit: RejectionCommit) -> AppResult<RejectionOutcome>;

    async fn list_audit_entries(
        &self,
        tenant_id: Uuid,
        query: &AuditQuery,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ApprovalAuditEntry>, u64)>;
}

#[async_trait]
impl PipelineStore for DbPool {
    async fn ping(&self) -> AppResult<()> {
        DbPool::ping(self).await
    }

    async fn insert_file(&self, file: &UploadedFile) -> AppResult<()> {
        DbPool::insert_file(self, file).await
    }

    async fn get_file(&self, tenant_id: Uuid, file_id: Uuid) -> AppResult<Option<UploadedFile>> {
        DbPool::get_file(self, tenant_id, file_id).await
    }

    async fn begin_attempt(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<UploadedFile>> {
        DbPool::begin_attempt(self, tenant_id, file_id).await
    }

    async fn advance_progress(
        &self,
        file_id: Uuid,
        attempt: i32,
        progress: i16,
        message: &str,
    ) -> AppResult<bool> {
        DbPool::advance_progress(self, file_id, attempt, progress, message).await
    }

    async fn fail_stale_attempts(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64> {
        DbPool::fail_stale_attempts(self, cutoff, message).await
    }

    async fn record_extraction(&self, extraction: NewExtraction) -> AppResult<RecordedExtraction> {
        DbPool::record_extraction(self, extraction).await
    }

    async fn record_failed_job(&self, job: NewFailedJob) -> AppResult<Uuid> {
        DbPool::record_failed_job(self, job).await
    }

    async fn record_gate_failure(
        &self,
        log: NewExtractionLog,
        attempt: i32,
        message: &str,
    ) -> AppResult<()> {
        DbPool::record_gate_failure(self, log, attempt, message).await
    }

    async fn get_job(&self, tenant_id: Uuid, job_id: Uuid) -> AppResult<Option<ExtractionJob>> {
        DbPool::get_job(self, tenant_id, job_id).await
    }

    async fn latest_completed_job(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<ExtractionJob>> {
        DbPool::latest_completed_job(self, tenant_id, file_id).await
    }

    async fn count_staging_items(&self, job_id: Uuid) -> AppResult<u64> {
        DbPool::count_staging_items(self, job_id).await
    }

    async fn staging_items_for_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> AppResult<Vec<StagingItem>> {
        DbPool::staging_items_for_job(self, tenant_id, job_id).await
    }

    async fn get_preview(
        &self,
        tenant_id: Uuid,
        preview_id: Uuid,
    ) -> AppResult<Option<ExtractionPreview>> {
        DbPool::get_preview(self, tenant_id, preview_id).await
    }

    async fn previews_for_file(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Vec<ExtractionPreview>> {
        DbPool::previews_for_file(self, tenant_id, file_id).await
    }

    async fn existing_natural_keys(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        keys: &[String],
    ) -> AppResult<HashSet<String>> {
        DbPool::existing_natural_keys(self, tenant_id, table, keys).await
    }

    async fn tracking_number_sources(
        &self,
        tenant_id: Uuid,
        numbers: &[String],
    ) -> AppResult<HashMap<String, Option<Uuid>>> {
        DbPool::tracking_number_sources(self, tenant_id, numbers).await
    }

    async fn find_current_record(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        natural_key: &str,
    ) -> AppResult<Option<BTreeMap<String, String>>> {
        DbPool::find_current_record(self, tenant_id, table, natural_key).await
    }

    async fn commit_approval(&self, commit: ApprovalCommit) -> AppResult<ApprovalOutcome> {
        DbPool::commit_approval(self, commit).await
    }

    async fn commit_rejection(&self, commit: RejectionCommit) -> AppResult<RejectionOutcome> {
        DbPool::commit_rejection(self, commit).await
    }

    async fn list_audit_entries(
        &self,
        tenant_id: Uuid,
        query: &AuditQuery,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ApprovalAuditEntry>, u64)> {
        DbPool::list_audit_entries(self, tenant_id, query, page).await
    }
}
