//! Database queries for staging items.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entity::staging_item::{self as item, Entity as StagingItemEntity};
use crate::error::{AppError, AppResult};
use crate::models::{ReviewStatus, StagingItem};

use super::DbPool;

fn to_domain(model: item::Model) -> AppResult<StagingItem> {
    let review_status = ReviewStatus::parse(&model.review_status).ok_or_else(|| {
        AppError::Database(format!("Unknown review status '{}'", model.review_status))
    })?;

    Ok(StagingItem {
        id: model.id,
        job_id: model.job_id,
        row_index: model.row_index,
        field_name: model.field_name,
        extracted_value: model.extracted_value,
        source_snippet: model.source_snippet,
        confidence: model.confidence,
        review_status,
    })
}

/// Move pending items to a terminal review status.
///
/// Items already approved or rejected are left untouched, so repeating a
/// transition changes zero rows.
pub(crate) async fn transition_items<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
    to: ReviewStatus,
) -> AppResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = StagingItemEntity::update_many()
        .col_expr(item::Column::ReviewStatus, Expr::value(to.as_str()))
        .col_expr(item::Column::ReviewedAt, Expr::value(Some(Utc::now())))
        .filter(item::Column::Id.is_in(ids.iter().copied()))
        .filter(item::Column::ReviewStatus.eq(ReviewStatus::Pending.as_str()))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to transition staging items: {}", e)))?;

    Ok(result.rows_affected)
}

/// Reject every item of a job that is still pending.
pub(crate) async fn reject_pending_for_job<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    job_id: Uuid,
) -> AppResult<u64> {
    let result = StagingItemEntity::update_many()
        .col_expr(
            item::Column::ReviewStatus,
            Expr::value(ReviewStatus::Rejected.as_str()),
        )
        .col_expr(item::Column::ReviewedAt, Expr::value(Some(Utc::now())))
        .filter(item::Column::TenantId.eq(tenant_id))
        .filter(item::Column::JobId.eq(job_id))
        .filter(item::Column::ReviewStatus.eq(ReviewStatus::Pending.as_str()))
        .exec(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to reject staging items: {}", e)))?;

    Ok(result.rows_affected)
}

impl DbPool {
    pub async fn count_staging_items(&self, job_id: Uuid) -> AppResult<u64> {
        let count = StagingItemEntity::find()
            .filter(item::Column::JobId.eq(job_id))
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count staging items: {}", e)))?;

        Ok(count)
    }

    /// All items of a job, scalars first, then rows in list order.
    pub async fn staging_items_for_job(
        &self,
        tenant_id: Uuid,
        job_id: Uuid,
    ) -> AppResult<Vec<StagingItem>> {
        let models = StagingItemEntity::find()
            .filter(item::Column::TenantId.eq(tenant_id))
            .filter(item::Column::JobId.eq(job_id))
            .order_by_asc(item::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get staging items: {}", e)))?;

        let mut items = models
            .into_iter()
            .map(to_domain)
            .collect::<AppResult<Vec<_>>>()?;
        items.sort_by_key(|i| (i.row_index.is_some(), i.field_name.clone(), i.row_index));
        Ok(items)
    }
}
