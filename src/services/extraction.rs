//! Extraction invoker: one attempt of turning a stored document into staging rows.
//!
//! An attempt begins with a compare-and-set on the file status, so two
//! attempts never run against the same file. Every exit path settles the
//! file: `extracted` on success, `failed` with a stored message otherwise.
//! Attempts that fail after starting append a job row, so the history of a
//! file survives later retries. Writes of an attempt that was superseded
//! (e.g. failed by the sweeper) are refused by the store.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{NewExtraction, NewFailedJob};
use crate::error::{AppError, AppResult};
use crate::models::{ExtractResponse, JobStatus, LogOutcome, NewExtractionLog, UploadedFile};

use super::PipelineContext;
use super::ai_client::DocumentUpload;
use super::extraction_schema::ModelExtraction;
use super::quality_gate::{self, GateInput};

/// Progress checkpoints of an attempt.
pub mod progress {
    pub const DOWNLOADING: (i16, &str) = (10, "Downloading document");
    pub const SUBMITTED: (i16, &str) = (30, "Submitted to extraction service");
    pub const PARSING: (i16, &str) = (70, "Validating extraction output");
    pub const PERSISTING: (i16, &str) = (90, "Saving staging items");
}

const IN_FLIGHT: &str = "An extraction attempt is already in progress for this file";

/// Run a new extraction attempt for a file.
pub async fn run_extraction(
    ctx: &PipelineContext,
    tenant_id: Uuid,
    file_id: Uuid,
) -> AppResult<ExtractResponse> {
    let file = ctx
        .store
        .get_file(tenant_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

    if !file.status.accepts_new_attempt() {
        return Err(AppError::Conflict(IN_FLIGHT.to_string()));
    }

    // Lost the race against a concurrent request
    let file = ctx
        .store
        .begin_attempt(tenant_id, file_id)
        .await?
        .ok_or_else(|| AppError::Conflict(IN_FLIGHT.to_string()))?;

    info!(
        file_id = %file.id,
        tenant_id = %tenant_id,
        attempt = file.attempt,
        "Extraction attempt started"
    );

    let result = attempt(ctx, &file).await;

    if let Err(e) = &result {
        if settles_file_itself(e) {
            warn!(file_id = %file.id, attempt = file.attempt, "Extraction rejected: {}", e);
        } else {
            error!(file_id = %file.id, attempt = file.attempt, "Extraction failed: {}", e);
            let failed = NewFailedJob {
                tenant_id: file.tenant_id,
                file_id: file.id,
                attempt: file.attempt,
                model: ctx.ai.model().to_string(),
                status: JobStatus::Failed,
                raw_output: None,
                error_message: e.to_string(),
            };
            if let Err(record_err) = ctx.store.record_failed_job(failed).await {
                error!(file_id = %file.id, "Failed to record failed attempt: {}", record_err);
            }
        }
    }

    result
}

/// Errors whose path already wrote the file's final state, or must not touch it.
fn settles_file_itself(err: &AppError) -> bool {
    matches!(
        err,
        AppError::SchemaViolation(_) | AppError::QualityGateFailed { .. } | AppError::Conflict(_)
    )
}

async fn checkpoint(ctx: &PipelineContext, file: &UploadedFile, step: (i16, &str)) -> AppResult<()> {
    let (value, message) = step;
    let advanced = ctx
        .store
        .advance_progress(file.id, file.attempt, value, message)
        .await?;
    if advanced {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Extraction attempt {} for file {} was superseded",
            file.attempt, file.id
        )))
    }
}

async fn attempt(ctx: &PipelineContext, file: &UploadedFile) -> AppResult<ExtractResponse> {
    checkpoint(ctx, file, progress::DOWNLOADING).await?;
    let data = ctx
        .objects
        .get(&file.storage_path)
        .await
        .map_err(|e| AppError::DownloadFailed(e.to_string()))?;

    checkpoint(ctx, file, progress::SUBMITTED).await?;
    let raw = ctx
        .ai
        .extract(DocumentUpload {
            filename: file.original_filename.clone(),
            mime_type: file.mime_type.clone(),
            data,
        })
        .await?;

    checkpoint(ctx, file, progress::PARSING).await?;
    let parsed = match ModelExtraction::parse(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            let job_id = ctx
                .store
                .record_failed_job(NewFailedJob {
                    tenant_id: file.tenant_id,
                    file_id: file.id,
                    attempt: file.attempt,
                    model: ctx.ai.model().to_string(),
                    status: JobStatus::SchemaViolation,
                    raw_output: Some(raw),
                    error_message: e.to_string(),
                })
                .await?;
            warn!(file_id = %file.id, job_id = %job_id, "Model output kept for forensics");
            return Err(e);
        }
    };

    let gate = GateInput {
        confidence: parsed.confidence,
        evidence_chars: parsed.evidence_chars,
    };
    if let Err(e) = quality_gate::evaluate(gate, &ctx.policy) {
        ctx.store
            .record_gate_failure(
                NewExtractionLog {
                    tenant_id: file.tenant_id,
                    file_id: file.id,
                    job_id: None,
                    outcome: LogOutcome::QualityGateFailed,
                    confidence: parsed.confidence,
                    evidence_chars: parsed.evidence_chars_i32(),
                    model: ctx.ai.model().to_string(),
                },
                file.attempt,
                &e.to_string(),
            )
            .await?;
        return Err(e);
    }

    checkpoint(ctx, file, progress::PERSISTING).await?;
    let items = parsed.staging_items();
    let declared_table = parsed
        .target_table
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let raw_result = serde_json::to_value(&parsed)?;

    let recorded = ctx
        .store
        .record_extraction(NewExtraction {
            tenant_id: file.tenant_id,
            file_id: file.id,
            attempt: file.attempt,
            model: ctx.ai.model().to_string(),
            quality_score: parsed.confidence,
            evidence_chars: parsed.evidence_chars_i32(),
            declared_table,
            raw_result,
            items,
        })
        .await?;

    info!(
        file_id = %file.id,
        job_id = %recorded.job_id,
        preview_id = %recorded.preview_id,
        items = recorded.items_count,
        confidence = parsed.confidence,
        "Extraction completed"
    );

    Ok(ExtractResponse {
        ok: true,
        extraction_id: recorded.job_id,
        preview_id: recorded.preview_id,
        confidence: parsed.confidence,
        evidence_chars: parsed.evidence_chars_i32(),
        items_count: recorded.items_count,
    })
}
