//! In-process `PipelineStore` with the same invariants as the PostgreSQL one.
//!
//! Used by the integration tests and for running the server without a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ApprovalAuditEntry, AuditQuery, DestinationRecord, DestinationTable, ExtractionJob,
    ExtractionPreview, FileStatus, JobStatus, LogOutcome, MAX_TRACKING_REISSUES,
    NewExtractionLog, PaginationParams, PreviewStatus, ReviewStatus, StagingItem, UploadedFile,
};

use super::store::{
    ApprovalCommit, ApprovalOutcome, NewExtraction, NewFailedJob, PipelineStore,
    RecordedExtraction, RejectionCommit, RejectionOutcome,
};

struct StoredRecord {
    tenant_id: Uuid,
    source_file_id: Option<Uuid>,
    record: DestinationRecord,
}

#[derive(Default)]
struct MemoryState {
    files: HashMap<Uuid, UploadedFile>,
    jobs: Vec<ExtractionJob>,
    items: Vec<(Uuid, StagingItem)>,
    previews: Vec<ExtractionPreview>,
    logs: Vec<NewExtractionLog>,
    audit: Vec<ApprovalAuditEntry>,
    records: Vec<StoredRecord>,
}

impl MemoryState {
    /// Same guard as the SQL settle: only the current in-flight attempt.
    fn settle_file(
        &mut self,
        file_id: Uuid,
        attempt: i32,
        status: FileStatus,
        error_message: Option<String>,
    ) -> AppResult<()> {
        let file = self
            .files
            .get_mut(&file_id)
            .filter(|f| f.attempt == attempt && f.status == FileStatus::Parsed)
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Extraction attempt {} for file {} is no longer current",
                    attempt, file_id
                ))
            })?;
        file.status = status;
        file.error_message = error_message;
        if status == FileStatus::Extracted {
            file.progress = 100;
            file.progress_message = Some("Completed".to_string());
        }
        file.updated_at = Utc::now();
        Ok(())
    }

    fn transition_items(&mut self, ids: &[Uuid], to: ReviewStatus) -> u64 {
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        let mut changed = 0;
        for (_, item) in self.items.iter_mut() {
            if wanted.contains(&item.id) && item.review_status == ReviewStatus::Pending {
                item.review_status = item.review_status.transition(to);
                changed += 1;
            }
        }
        changed
    }

    fn holder(&self, tenant_id: Uuid, table: DestinationTable, key: &str) -> Option<&StoredRecord> {
        self.records.iter().find(|r| {
            r.tenant_id == tenant_id && r.record.table() == table && r.record.natural_key() == key
        })
    }

    fn key_exists(&self, tenant_id: Uuid, table: DestinationTable, key: &str) -> bool {
        self.holder(tenant_id, table, key).is_some()
    }

    /// Same contract as the SQL insert: a generated tracking number held by
    /// another file's entry is reissued, any other collision skips the record.
    fn insert_record(
        &mut self,
        tenant_id: Uuid,
        file_id: Uuid,
        mut record: DestinationRecord,
    ) -> AppResult<bool> {
        for _ in 0..=MAX_TRACKING_REISSUES {
            let holder = self
                .holder(tenant_id, record.table(), &record.natural_key())
                .map(|r| r.source_file_id);
            let Some(holder) = holder else {
                self.records.push(StoredRecord {
                    tenant_id,
                    source_file_id: Some(file_id),
                    record,
                });
                return Ok(true);
            };
            if holder == Some(file_id) || !record.reissue_tracking_number() {
                return Ok(false);
            }
        }

        Err(AppError::Conflict(format!(
            "No free tracking number after {} attempts",
            MAX_TRACKING_REISSUES
        )))
    }
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> AppResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Database("Memory store mutex poisoned".to_string()))
    }

    /// Jobs recorded for a file, oldest first.
    pub fn jobs_for_file(&self, file_id: Uuid) -> Vec<ExtractionJob> {
        self.state()
            .map(|s| s.jobs.iter().filter(|j| j.file_id == file_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn staging_item_count(&self) -> usize {
        self.state().map(|s| s.items.len()).unwrap_or_default()
    }

    pub fn extraction_logs(&self) -> Vec<NewExtractionLog> {
        self.state().map(|s| s.logs.clone()).unwrap_or_default()
    }

    pub fn destination_records(&self, tenant_id: Uuid) -> Vec<DestinationRecord> {
        self.state()
            .map(|s| {
                s.records
                    .iter()
                    .filter(|r| r.tenant_id == tenant_id)
                    .map(|r| r.record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn audit_entries(&self) -> Vec<ApprovalAuditEntry> {
        self.state().map(|s| s.audit.clone()).unwrap_or_default()
    }

    /// Insert a destination record directly, bypassing approval.
    pub fn seed_record(
        &self,
        tenant_id: Uuid,
        source_file_id: Option<Uuid>,
        record: DestinationRecord,
    ) {
        if let Ok(mut state) = self.state() {
            state.records.push(StoredRecord {
                tenant_id,
                source_file_id,
                record,
            });
        }
    }

    /// Move a file's last update into the past (sweeper tests).
    pub fn backdate_file(&self, file_id: Uuid, updated_at: DateTime<Utc>) {
        if let Ok(mut state) = self.state() {
            if let Some(file) = state.files.get_mut(&file_id) {
                file.updated_at = updated_at;
            }
        }
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.state().map(|_| ())
    }

    async fn insert_file(&self, file: &UploadedFile) -> AppResult<()> {
        let mut state = self.state()?;
        if state.files.contains_key(&file.id) {
            return Err(AppError::Database(format!("Duplicate file id {}", file.id)));
        }
        state.files.insert(file.id, file.clone());
        Ok(())
    }

    async fn get_file(&self, tenant_id: Uuid, file_id: Uuid) -> AppResult<Option<UploadedFile>> {
        Ok(self
            .state()?
            .files
            .get(&file_id)
            .filter(|f| f.tenant_id == tenant_id)
            .cloned())
    }

    async fn begin_attempt(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<UploadedFile>> {
        let mut state = self.state()?;
        let Some(file) = state
            .files
            .get_mut(&file_id)
            .filter(|f| f.tenant_id == tenant_id && f.status.accepts_new_attempt())
        else {
            return Ok(None);
        };
        file.status = FileStatus::Parsed;
        file.attempt += 1;
        file.progress = 0;
        file.progress_message = Some("Queued".to_string());
        file.error_message = None;
        file.updated_at = Utc::now();
        Ok(Some(file.clone()))
    }

    async fn advance_progress(
        &self,
        file_id: Uuid,
        attempt: i32,
        progress: i16,
        message: &str,
    ) -> AppResult<bool> {
        let mut state = self.state()?;
        match state.files.get_mut(&file_id) {
            Some(file)
                if file.attempt == attempt
                    && file.status == FileStatus::Parsed
                    && file.progress < progress =>
            {
                file.progress = progress;
                file.progress_message = Some(message.to_string());
                file.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_stale_attempts(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64> {
        let mut state = self.state()?;
        let mut failed = 0;
        for file in state.files.values_mut() {
            if file.status == FileStatus::Parsed && file.updated_at < cutoff {
                file.status = FileStatus::Failed;
                file.error_message = Some(message.to_string());
                file.updated_at = Utc::now();
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn record_extraction(&self, extraction: NewExtraction) -> AppResult<RecordedExtraction> {
        let mut state = self.state()?;
        // Settle first: a superseded attempt must leave no rows behind.
        state.settle_file(
            extraction.file_id,
            extraction.attempt,
            FileStatus::Extracted,
            None,
        )?;

        let now = Utc::now();
        let job_id = Uuid::now_v7();
        let preview_id = Uuid::now_v7();
        let items_count = extraction.items.len();

        state.jobs.push(ExtractionJob {
            id: job_id,
            tenant_id: extraction.tenant_id,
            file_id: extraction.file_id,
            attempt: extraction.attempt,
            model: extraction.model.clone(),
            status: JobStatus::Completed,
            quality_score: Some(extraction.quality_score),
            evidence_chars: Some(extraction.evidence_chars),
            declared_table: extraction.declared_table.clone(),
            raw_result: extraction.raw_result,
            error_message: None,
            created_at: now,
        });

        for item in extraction.items {
            state.items.push((
                extraction.tenant_id,
                StagingItem {
                    id: Uuid::now_v7(),
                    job_id,
                    row_index: item.row_index,
                    field_name: item.field_name,
                    extracted_value: item.extracted_value,
                    source_snippet: item.source_snippet,
                    confidence: item.confidence,
                    review_status: ReviewStatus::Pending,
                },
            ));
        }

        state.previews.push(ExtractionPreview {
            id: preview_id,
            tenant_id: extraction.tenant_id,
            file_id: extraction.file_id,
            job_id,
            declared_table: extraction.declared_table,
            confidence: extraction.quality_score,
            status: PreviewStatus::Pending,
            resolved_at: None,
            created_at: now,
        });

        state.logs.push(NewExtractionLog {
            tenant_id: extraction.tenant_id,
            file_id: extraction.file_id,
            job_id: Some(job_id),
            outcome: LogOutcome::Accepted,
            confidence: extraction.quality_score,
            evidence_chars: extraction.evidence_chars,
            model: extraction.model,
        });

        Ok(RecordedExtraction {
            job_id,
            preview_id,
            items_count,
        })
    }

    async fn record_failed_job(&self, job: NewFailedJob) -> AppResult<Uuid> {
        let mut state = self.state()?;
        state.settle_file(
            job.file_id,
            job.attempt,
            FileStatus::Failed,
            Some(job.error_message.clone()),
        )?;

        let job_id = Uuid::now_v7();
        state.jobs.push(ExtractionJob {
            id: job_id,
            tenant_id: job.tenant_id,
            file_id: job.file_id,
            attempt: job.attempt,
            model: job.model,
            status: job.status,
            quality_score: None,
            evidence_chars: None,
            declared_table: None,
            raw_result: json!({ "raw": job.raw_output }),
            error_message: Some(job.error_message),
            created_at: Utc::now(),
        });
        Ok(job_id)
    }

    async fn record_gate_failure(
        &self,
        log: NewExtractionLog,
        attempt: i32,
        message: &str,
    ) -> AppResult<()> {
        let mut state = self.state()?;
        state.settle_file(
            log.file_id,
            attempt,
            FileStatus::Failed,
            Some(message.to_string()),
        )?;
        state.logs.push(log);
        Ok(())
    }

    async fn get_job(&self, tenant_id: Uuid, job_id: Uuid) -> AppResult<Option<ExtractionJob>> {
        Ok(self
            .state()?
            .jobs
            .iter()
            .find(|j| j.id == job_id && j.tenant_id == tenant_id)
            .cloned())
    }

    async fn latest_completed_job(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<ExtractionJob>> {
        Ok(self
            .state()?
            .jobs
            .iter()
            .rev()
            .find(|j| {
                j.tenant_id == tenant_id && j.file_id == file_id && j.status == JobStatus::Completed
            })
            .cloned())
    }

    async fn count_staging_items(&self, job_id: Uuid) -> AppResult<u64> {
        Ok(self
            .state()?
            .items
            .iter()
            .filter(|(_, i)| i.job_id == job_id)
            .count() as u64)
    }

    async fn staging_items_for_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> AppResult<Vec<StagingItem>> {
        let mut items: Vec<StagingItem> = self
            .state()?
            .items
            .iter()
            .filter(|(t, i)| *t == tenant_id && i.job_id == job_id)
            .map(|(_, i)| i.clone())
            .collect();
        items.sort_by_key(|i| (i.row_index.is_some(), i.field_name.clone(), i.row_index));
        Ok(items)
    }

    async fn get_preview(
        &self,
        tenant_id: Uuid,
        preview_id: Uuid,
    ) -> AppResult<Option<ExtractionPreview>> {
        Ok(self
            .state()?
            .previews
            .iter()
            .find(|p| p.id == preview_id && p.tenant_id == tenant_id)
            .cloned())
    }

    async fn previews_for_file(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Vec<ExtractionPreview>> {
        Ok(self
            .state()?
            .previews
            .iter()
            .rev()
            .filter(|p| p.tenant_id == tenant_id && p.file_id == file_id)
            .cloned()
            .collect())
    }

    async fn existing_natural_keys(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        keys: &[String],
    ) -> AppResult<HashSet<String>> {
        let state = self.state()?;
        Ok(keys
            .iter()
            .filter(|k| state.key_exists(tenant_id, table, k))
            .cloned()
            .collect())
    }

    async fn tracking_number_sources(
        &self,
        tenant_id: Uuid,
        numbers: &[String],
    ) -> AppResult<HashMap<String, Option<Uuid>>> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .filter_map(|r| match &r.record {
                DestinationRecord::WasteLog(w) if numbers.contains(&w.tracking_number) => {
                    Some((w.tracking_number.clone(), r.source_file_id))
                }
                _ => None,
            })
            .collect())
    }

    async fn find_current_record(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        natural_key: &str,
    ) -> AppResult<Option<BTreeMap<String, String>>> {
        let state = self.state()?;
        let found = state.records.iter().find_map(|r| match &r.record {
            DestinationRecord::Supplier(s)
                if r.tenant_id == tenant_id
                    && table == DestinationTable::Supplier
                    && s.tax_id == natural_key =>
            {
                Some(s.clone())
            }
            _ => None,
        });

        Ok(found.map(|s| {
            let mut fields = BTreeMap::new();
            fields.insert("legal_name".to_string(), s.legal_name);
            fields.insert("tax_id".to_string(), s.tax_id);
            let optional = [
                ("trade_name", s.trade_name),
                ("email", s.email),
                ("phone", s.phone),
                ("category", s.category),
                ("city", s.city),
                ("state", s.state),
            ];
            for (name, value) in optional {
                if let Some(value) = value {
                    fields.insert(name.to_string(), value);
                }
            }
            fields
        }))
    }

    async fn commit_approval(&self, commit: ApprovalCommit) -> AppResult<ApprovalOutcome> {
        let mut state = self.state()?;

        let status = state
            .previews
            .iter()
            .find(|p| p.id == commit.preview_id && p.tenant_id == commit.tenant_id)
            .map(|p| p.status)
            .ok_or_else(|| AppError::NotFound(format!("Preview {}", commit.preview_id)))?;
        if status == PreviewStatus::Rejected {
            return Err(AppError::Conflict(format!(
                "Preview {} was rejected and cannot be approved",
                commit.preview_id
            )));
        }

        let total = commit.records.len() as u64;
        let mut inserted = 0u64;
        for record in commit.records {
            if state.insert_record(commit.tenant_id, commit.file_id, record)? {
                inserted += 1;
            }
        }
        let raced = total - inserted;

        state.transition_items(&commit.approved_items, ReviewStatus::Approved);
        state.transition_items(&commit.rejected_items, ReviewStatus::Rejected);

        let now = Utc::now();
        if let Some(preview) = state
            .previews
            .iter_mut()
            .find(|p| p.id == commit.preview_id && p.status == PreviewStatus::Pending)
        {
            preview.status = PreviewStatus::Approved;
            preview.resolved_at = Some(now);
        }

        let mut audit = commit.audit;
        audit.records_written = inserted as i64;
        audit.records_filtered += raced as i64;
        let records_filtered = audit.records_filtered as u64;
        let audit_id = Uuid::now_v7();
        state
            .audit
            .push(ApprovalAuditEntry::from_new(audit_id, audit, now));

        Ok(ApprovalOutcome {
            audit_id,
            records_inserted: inserted,
            records_filtered,
        })
    }

    async fn commit_rejection(&self, commit: RejectionCommit) -> AppResult<RejectionOutcome> {
        let mut state = self.state()?;
        let now = Utc::now();

        let preview = state
            .previews
            .iter_mut()
            .find(|p| {
                p.id == commit.preview_id
                    && p.tenant_id == commit.tenant_id
                    && p.status == PreviewStatus::Pending
            })
            .ok_or_else(|| {
                AppError::Conflict(format!("Preview {} is already resolved", commit.preview_id))
            })?;
        preview.status = PreviewStatus::Rejected;
        preview.resolved_at = Some(now);

        let pending: Vec<Uuid> = state
            .items
            .iter()
            .filter(|(t, i)| {
                *t == commit.tenant_id
                    && i.job_id == commit.job_id
                    && i.review_status == ReviewStatus::Pending
            })
            .map(|(_, i)| i.id)
            .collect();
        let items_rejected = state.transition_items(&pending, ReviewStatus::Rejected);

        let audit_id = Uuid::now_v7();
        state
            .audit
            .push(ApprovalAuditEntry::from_new(audit_id, commit.audit, now));

        Ok(RejectionOutcome {
            audit_id,
            items_rejected,
        })
    }

    async fn list_audit_entries(
        &self,
        tenant_id: Uuid,
        query: &AuditQuery,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ApprovalAuditEntry>, u64)> {
        let state = self.state()?;
        let matching: Vec<&ApprovalAuditEntry> = state
            .audit
            .iter()
            .rev()
            .filter(|e| e.tenant_id == tenant_id)
            .filter(|e| query.file_id.is_none_or(|id| e.file_id == id))
            .filter(|e| query.preview_id.is_none_or(|id| e.preview_id == id))
            .collect();

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.clamped_limit() as usize)
            .cloned()
            .collect();
        Ok((entries, total))
    }
}
