//! Approval service: turns a reviewed preview into destination records.
//!
//! Approve runs reconcile, resolve, classify, transform, dedup, and a
//! single commit. Nothing is written when any step before the commit fails.

use std::time::Instant;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::{ApprovalCommit, RejectionCommit};
use crate::error::{AppError, AppResult};
use crate::models::{
    ApproveRequest, ApproveResponse, AuditAction, JobStatus, NewAuditEntry, PreviewStatus,
    RejectRequest, RejectResponse,
};

use super::PipelineContext;
use super::classifier::classify_logged;
use super::dedup;
use super::reconciliation::{extracted_bag, load_review, resolve};
use super::transform::{TransformContext, transform};

pub async fn approve(
    ctx: &PipelineContext,
    user: &AuthenticatedUser,
    preview_id: Uuid,
    request: ApproveRequest,
) -> AppResult<ApproveResponse> {
    let started = Instant::now();
    let tenant_id = user.tenant_id;

    let review = load_review(ctx, tenant_id, preview_id).await?;
    let preview = &review.preview;
    if preview.status == PreviewStatus::Rejected {
        return Err(AppError::Conflict(format!(
            "Preview {} was rejected and cannot be approved",
            preview_id
        )));
    }

    let job = ctx
        .store
        .get_job(tenant_id, preview.job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Extraction job {}", preview.job_id)))?;
    if job.status != JobStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Extraction job {} is {} and cannot be approved",
            job.id,
            job.status.as_str()
        )));
    }

    let mode = request.mode.unwrap_or_default();
    let edits = request.edited_data.unwrap_or_default();
    let resolution = resolve(&review.comparison, mode, &edits)?;

    let classification = classify_logged(
        &resolution.bag,
        preview.declared_table.as_deref(),
        &ctx.classifier_rules,
    )?;
    let table = classification.table;

    let transform_ctx = TransformContext {
        preview_id,
        today: Utc::now().date_naive(),
        hazard_rules: &ctx.hazard_rules,
    };
    let mut candidates = transform(table, &resolution.bag, &transform_ctx)?;
    dedup::reissue_foreign_tracking_numbers(
        ctx.store.as_ref(),
        tenant_id,
        preview.file_id,
        &mut candidates,
    )
    .await?;
    let deduplicated = dedup::filter_new(ctx.store.as_ref(), tenant_id, table, candidates).await?;

    let audit = NewAuditEntry {
        tenant_id,
        preview_id,
        file_id: preview.file_id,
        approved_by: user.user_id.clone(),
        action: resolution.action,
        original_payload: extracted_bag(&review.items).to_json(),
        edited_payload: resolution.edited_payload,
        edited_fields_count: resolution.edited_fields_count as i32,
        confidence: preview.confidence,
        declared_table: preview.declared_table.clone(),
        target_table: Some(table.as_str().to_string()),
        records_written: 0,
        records_filtered: deduplicated.filtered as i64,
        notes: request.approval_notes.filter(|n| !n.trim().is_empty()),
        processing_ms: started.elapsed().as_millis() as i64,
    };

    let outcome = ctx
        .store
        .commit_approval(ApprovalCommit {
            tenant_id,
            preview_id,
            file_id: preview.file_id,
            records: deduplicated.records,
            approved_items: resolution.approved_items,
            rejected_items: resolution.rejected_items,
            audit,
        })
        .await?;

    info!(
        preview_id = %preview_id,
        tenant_id = %tenant_id,
        table = %table,
        inserted = outcome.records_inserted,
        filtered = outcome.records_filtered,
        edited = resolution.edited_fields_count,
        "Preview approved"
    );

    Ok(ApproveResponse {
        success: true,
        records_inserted: outcome.records_inserted,
        records_filtered: outcome.records_filtered,
        target_table: table,
        declared_table: preview.declared_table.clone(),
        processing_time_seconds: started.elapsed().as_secs_f64(),
        edited_fields_count: resolution.edited_fields_count,
        audit_id: outcome.audit_id,
    })
}

pub async fn reject(
    ctx: &PipelineContext,
    user: &AuthenticatedUser,
    preview_id: Uuid,
    request: RejectRequest,
) -> AppResult<RejectResponse> {
    let started = Instant::now();
    let tenant_id = user.tenant_id;

    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::InvalidInput(
            "A rejection reason is required".to_string(),
        ));
    }

    let preview = ctx
        .store
        .get_preview(tenant_id, preview_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Preview {}", preview_id)))?;
    if preview.status != PreviewStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Preview {} is already {}",
            preview_id,
            preview.status.as_str()
        )));
    }

    let items = ctx
        .store
        .staging_items_for_job(tenant_id, preview.job_id)
        .await?;

    let outcome = ctx
        .store
        .commit_rejection(RejectionCommit {
            tenant_id,
            preview_id,
            job_id: preview.job_id,
            audit: NewAuditEntry {
                tenant_id,
                preview_id,
                file_id: preview.file_id,
                approved_by: user.user_id.clone(),
                action: AuditAction::Rejected,
                original_payload: extracted_bag(&items).to_json(),
                edited_payload: None,
                edited_fields_count: 0,
                confidence: preview.confidence,
                declared_table: preview.declared_table.clone(),
                target_table: None,
                records_written: 0,
                records_filtered: 0,
                notes: Some(reason.to_string()),
                processing_ms: started.elapsed().as_millis() as i64,
            },
        })
        .await?;

    info!(
        preview_id = %preview_id,
        tenant_id = %tenant_id,
        items_rejected = outcome.items_rejected,
        "Preview rejected"
    );

    Ok(RejectResponse {
        success: true,
        preview_id,
        items_rejected: outcome.items_rejected,
        audit_id: outcome.audit_id,
    })
}
