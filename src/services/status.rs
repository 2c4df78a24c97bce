//! Status poller contract. Pure reads; polling never changes state.

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ExtractionJob, ExtractionStatus, FileStatus, JobStatus, UploadedFile};

use super::PipelineContext;

/// Current extraction status of a file, or of one of its jobs.
pub async fn extraction_status(
    ctx: &PipelineContext,
    tenant_id: Uuid,
    file_id: Uuid,
    job_id: Option<Uuid>,
) -> AppResult<ExtractionStatus> {
    let file = ctx
        .store
        .get_file(tenant_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))?;

    if let Some(job_id) = job_id {
        let job = ctx
            .store
            .get_job(tenant_id, job_id)
            .await?
            .filter(|j| j.file_id == file_id)
            .ok_or_else(|| AppError::NotFound(format!("Extraction job {}", job_id)))?;
        return job_status(ctx, &job).await;
    }

    match file.status {
        FileStatus::Uploaded => Ok(ExtractionStatus::Queued),
        FileStatus::Parsed => Ok(in_flight_status(&file)),
        FileStatus::Failed => Ok(ExtractionStatus::Failed {
            message: file
                .error_message
                .unwrap_or_else(|| "Extraction failed".to_string()),
        }),
        FileStatus::Extracted => {
            let job = ctx
                .store
                .latest_completed_job(tenant_id, file_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Completed extraction for file {}", file_id))
                })?;
            job_status(ctx, &job).await
        }
    }
}

/// Status of an attempt that has started but not settled.
pub fn in_flight_status(file: &UploadedFile) -> ExtractionStatus {
    if file.progress <= 0 {
        return ExtractionStatus::Queued;
    }
    ExtractionStatus::Processing {
        progress: file.progress.clamp(0, 100) as u8,
        message: file
            .progress_message
            .clone()
            .unwrap_or_else(|| "Processing".to_string()),
    }
}

async fn job_status(ctx: &PipelineContext, job: &ExtractionJob) -> AppResult<ExtractionStatus> {
    match job.status {
        JobStatus::Completed => Ok(ExtractionStatus::Completed {
            extraction_id: job.id,
            items_count: ctx.store.count_staging_items(job.id).await?,
            quality_score: job.quality_score.unwrap_or_default(),
        }),
        JobStatus::SchemaViolation => Ok(ExtractionStatus::Failed {
            message: job
                .error_message
                .clone()
                .unwrap_or_else(|| "Extraction output violated the schema".to_string()),
        }),
        JobStatus::Failed => Ok(ExtractionStatus::Failed {
            message: job
                .error_message
                .clone()
                .unwrap_or_else(|| "Extraction failed".to_string()),
        }),
    }
}
