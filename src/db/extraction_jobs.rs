//! Database queries for extraction jobs and the extraction outcome transactions.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

use crate::entity::extraction_job::{self as job, Entity as Job};
use crate::entity::uploaded_file::{self as file, Entity as File};
use crate::entity::{extraction_log, extraction_preview, staging_item};
use crate::error::{AppError, AppResult};
use crate::models::{
    ExtractionJob, FileStatus, JobStatus, LogOutcome, NewExtractionLog, PreviewStatus, ReviewStatus,
};

use super::DbPool;
use super::store::{NewExtraction, NewFailedJob, RecordedExtraction};

pub(crate) fn to_domain(model: job::Model) -> AppResult<ExtractionJob> {
    let status = JobStatus::parse(&model.status)
        .ok_or_else(|| AppError::Database(format!("Unknown job status '{}'", model.status)))?;

    Ok(ExtractionJob {
        id: model.id,
        tenant_id: model.tenant_id,
        file_id: model.file_id,
        attempt: model.attempt,
        model: model.model,
        status,
        quality_score: model.quality_score,
        evidence_chars: model.evidence_chars,
        declared_table: model.declared_table,
        raw_result: model.raw_result,
        error_message: model.error_message,
        created_at: model.created_at,
    })
}

/// Settle the file row of an attempt. Fails when the attempt was superseded
/// (swept as stale or replaced by a newer attempt).
async fn settle_file<C: ConnectionTrait>(
    conn: &C,
    file_id: Uuid,
    attempt: i32,
    status: FileStatus,
    error_message: Option<String>,
) -> AppResult<()> {
    let mut update = File::update_many()
        .col_expr(file::Column::Status, Expr::value(status.as_str()))
        .col_expr(file::Column::ErrorMessage, Expr::value(error_message));

    if status == FileStatus::Extracted {
        update = update
            .col_expr(file::Column::Progress, Expr::value(100i16))
            .col_expr(
                file::Column::ProgressMessage,
                Expr::value(Some("Completed".to_string())),
            );
    }

    let result = update
        .filter(file::Column::Id.eq(file_id))
        .filter(file::Column::Attempt.eq(attempt))
        .filter(file::Column::Status.eq(FileStatus::Parsed.as_str()))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to settle file: {}", e)))?;

    if result.rows_affected == 0 {
        return Err(AppError::Conflict(format!(
            "Extraction attempt {} for file {} is no longer current",
            attempt, file_id
        )));
    }
    Ok(())
}

async fn insert_log<C: ConnectionTrait>(conn: &C, log: &NewExtractionLog) -> AppResult<()> {
    extraction_log::ActiveModel {
        id: Set(Uuid::now_v7()),
        tenant_id: Set(log.tenant_id),
        file_id: Set(log.file_id),
        job_id: Set(log.job_id),
        outcome: Set(log.outcome.as_str().to_string()),
        confidence: Set(log.confidence),
        evidence_chars: Set(log.evidence_chars),
        model: Set(log.model.clone()),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to insert extraction log: {}", e)))?;

    Ok(())
}

impl DbPool {
    /// Persist a gated extraction: job, staging rows, preview, log and file
    /// status, all or nothing.
    pub async fn record_extraction(&self, extraction: NewExtraction) -> AppResult<RecordedExtraction> {
        let now = Utc::now();
        let job_id = Uuid::now_v7();
        let preview_id = Uuid::now_v7();
        let items_count = extraction.items.len();

        let txn = self.connection().begin().await?;

        job::ActiveModel {
            id: Set(job_id),
            tenant_id: Set(extraction.tenant_id),
            file_id: Set(extraction.file_id),
            attempt: Set(extraction.attempt),
            model: Set(extraction.model.clone()),
            status: Set(JobStatus::Completed.as_str().to_string()),
            quality_score: Set(Some(extraction.quality_score)),
            evidence_chars: Set(Some(extraction.evidence_chars)),
            declared_table: Set(extraction.declared_table.clone()),
            raw_result: Set(extraction.raw_result),
            error_message: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert extraction job: {}", e)))?;

        if !extraction.items.is_empty() {
            let rows = extraction.items.into_iter().map(|item| staging_item::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(extraction.tenant_id),
                job_id: Set(job_id),
                row_index: Set(item.row_index),
                field_name: Set(item.field_name),
                extracted_value: Set(item.extracted_value),
                source_snippet: Set(item.source_snippet),
                confidence: Set(item.confidence),
                review_status: Set(ReviewStatus::Pending.as_str().to_string()),
                reviewed_at: Set(None),
                created_at: Set(now),
            });

            staging_item::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert staging items: {}", e)))?;
        }

        extraction_preview::ActiveModel {
            id: Set(preview_id),
            tenant_id: Set(extraction.tenant_id),
            file_id: Set(extraction.file_id),
            job_id: Set(job_id),
            declared_table: Set(extraction.declared_table),
            confidence: Set(extraction.quality_score),
            status: Set(PreviewStatus::Pending.as_str().to_string()),
            resolved_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert preview: {}", e)))?;

        insert_log(
            &txn,
            &NewExtractionLog {
                tenant_id: extraction.tenant_id,
                file_id: extraction.file_id,
                job_id: Some(job_id),
                outcome: LogOutcome::Accepted,
                confidence: extraction.quality_score,
                evidence_chars: extraction.evidence_chars,
                model: extraction.model,
            },
        )
        .await?;

        settle_file(
            &txn,
            extraction.file_id,
            extraction.attempt,
            FileStatus::Extracted,
            None,
        )
        .await?;

        txn.commit().await?;

        Ok(RecordedExtraction {
            job_id,
            preview_id,
            items_count,
        })
    }

    /// Append the job of a failed attempt and fail the file.
    pub async fn record_failed_job(&self, failed: NewFailedJob) -> AppResult<Uuid> {
        let job_id = Uuid::now_v7();
        let txn = self.connection().begin().await?;

        job::ActiveModel {
            id: Set(job_id),
            tenant_id: Set(failed.tenant_id),
            file_id: Set(failed.file_id),
            attempt: Set(failed.attempt),
            model: Set(failed.model),
            status: Set(failed.status.as_str().to_string()),
            quality_score: Set(None),
            evidence_chars: Set(None),
            declared_table: Set(None),
            raw_result: Set(json!({ "raw": failed.raw_output })),
            error_message: Set(Some(failed.error_message.clone())),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert failed job: {}", e)))?;

        settle_file(
            &txn,
            failed.file_id,
            failed.attempt,
            FileStatus::Failed,
            Some(failed.error_message),
        )
        .await?;

        txn.commit().await?;
        Ok(job_id)
    }

    /// Log a quality gate failure and fail the file without writing a job.
    pub async fn record_gate_failure(
        &self,
        log: NewExtractionLog,
        attempt: i32,
        message: &str,
    ) -> AppResult<()> {
        let txn = self.connection().begin().await?;
        insert_log(&txn, &log).await?;
        settle_file(
            &txn,
            log.file_id,
            attempt,
            FileStatus::Failed,
            Some(message.to_string()),
        )
        .await?;
        txn.commit().await?;
        Ok(())
    }

    /// Get a job by ID within a tenant.
    pub async fn get_job(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<ExtractionJob>> {
        let result = Job::find_by_id(id)
            .filter(job::Column::TenantId.eq(tenant_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get job: {}", e)))?;

        result.map(to_domain).transpose()
    }

    /// Most recent completed job of a file.
    pub async fn latest_completed_job(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Option<ExtractionJob>> {
        let result = Job::find()
            .filter(job::Column::TenantId.eq(tenant_id))
            .filter(job::Column::FileId.eq(file_id))
            .filter(job::Column::Status.eq(JobStatus::Completed.as_str()))
            .order_by_desc(job::Column::Id) // UUIDv7 is time-ordered
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get latest job: {}", e)))?;

        result.map(to_domain).transpose()
    }
}
