//! Database queries for previews and the approval/rejection transactions.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait};
use uuid::Uuid;

use crate::entity::extraction_preview::{self as preview, Entity as Preview};
use crate::error::{AppError, AppResult};
use crate::models::{ExtractionPreview, PreviewStatus, ReviewStatus};

use super::DbPool;
use super::approval_audit::insert_audit;
use super::destinations::insert_record_reissuing;
use super::staging_items::{reject_pending_for_job, transition_items};
use super::store::{ApprovalCommit, ApprovalOutcome, RejectionCommit, RejectionOutcome};

fn to_domain(model: preview::Model) -> AppResult<ExtractionPreview> {
    let status = PreviewStatus::parse(&model.status)
        .ok_or_else(|| AppError::Database(format!("Unknown preview status '{}'", model.status)))?;

    Ok(ExtractionPreview {
        id: model.id,
        tenant_id: model.tenant_id,
        file_id: model.file_id,
        job_id: model.job_id,
        declared_table: model.declared_table,
        confidence: model.confidence,
        status,
        resolved_at: model.resolved_at,
        created_at: model.created_at,
    })
}

impl DbPool {
    pub async fn get_preview(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> AppResult<Option<ExtractionPreview>> {
        let result = Preview::find_by_id(id)
            .filter(preview::Column::TenantId.eq(tenant_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get preview: {}", e)))?;

        result.map(to_domain).transpose()
    }

    /// Previews of a file, newest first.
    pub async fn previews_for_file(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
    ) -> AppResult<Vec<ExtractionPreview>> {
        Preview::find()
            .filter(preview::Column::TenantId.eq(tenant_id))
            .filter(preview::Column::FileId.eq(file_id))
            .order_by_desc(preview::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list previews: {}", e)))?
            .into_iter()
            .map(to_domain)
            .collect()
    }

    /// Write approved records, transition staging items, resolve the preview
    /// and append the audit entry in one transaction.
    pub async fn commit_approval(&self, commit: ApprovalCommit) -> AppResult<ApprovalOutcome> {
        let txn = self.connection().begin().await?;

        // Row lock serializes concurrent decisions on the same preview
        let current = Preview::find_by_id(commit.preview_id)
            .filter(preview::Column::TenantId.eq(commit.tenant_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Preview {}", commit.preview_id)))?;
        if current.status == PreviewStatus::Rejected.as_str() {
            return Err(AppError::Conflict(format!(
                "Preview {} was rejected and cannot be approved",
                commit.preview_id
            )));
        }

        let total = commit.records.len() as u64;
        let mut inserted = 0u64;
        for record in commit.records {
            if insert_record_reissuing(&txn, commit.tenant_id, commit.file_id, record).await? {
                inserted += 1;
            }
        }
        let raced = total - inserted;

        transition_items(&txn, &commit.approved_items, ReviewStatus::Approved).await?;
        transition_items(&txn, &commit.rejected_items, ReviewStatus::Rejected).await?;

        Preview::update_many()
            .col_expr(
                preview::Column::Status,
                Expr::value(PreviewStatus::Approved.as_str()),
            )
            .col_expr(preview::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(preview::Column::Id.eq(commit.preview_id))
            .filter(preview::Column::Status.eq(PreviewStatus::Pending.as_str()))
            .exec(&txn)
            .await?;

        let mut audit = commit.audit;
        audit.records_written = inserted as i64;
        audit.records_filtered += raced as i64;
        let records_filtered = audit.records_filtered as u64;
        let audit_id = insert_audit(&txn, audit).await?;

        txn.commit().await?;

        Ok(ApprovalOutcome {
            audit_id,
            records_inserted: inserted,
            records_filtered,
        })
    }

    /// Reject a pending preview and its pending items, with an audit entry.
    pub async fn commit_rejection(&self, commit: RejectionCommit) -> AppResult<RejectionOutcome> {
        let txn = self.connection().begin().await?;

        let resolved = Preview::update_many()
            .col_expr(
                preview::Column::Status,
                Expr::value(PreviewStatus::Rejected.as_str()),
            )
            .col_expr(preview::Column::ResolvedAt, Expr::value(Some(Utc::now())))
            .filter(preview::Column::Id.eq(commit.preview_id))
            .filter(preview::Column::TenantId.eq(commit.tenant_id))
            .filter(preview::Column::Status.eq(PreviewStatus::Pending.as_str()))
            .exec(&txn)
            .await?;
        if resolved.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "Preview {} is already resolved",
                commit.preview_id
            )));
        }

        let items_rejected = reject_pending_for_job(&txn, commit.tenant_id, commit.job_id).await?;
        let audit_id = insert_audit(&txn, commit.audit).await?;

        txn.commit().await?;

        Ok(RejectionOutcome {
            audit_id,
            items_rejected,
        })
    }
}
