//! Database queries for the approval audit log. Insert and read only.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entity::approval_audit::{self as audit, Entity as Audit};
use crate::error::{AppError, AppResult};
use crate::models::{ApprovalAuditEntry, AuditAction, AuditQuery, NewAuditEntry, PaginationParams};

use super::DbPool;

fn to_domain(model: audit::Model) -> AppResult<ApprovalAuditEntry> {
    let action = AuditAction::parse(&model.action)
        .ok_or_else(|| AppError::Database(format!("Unknown audit action '{}'", model.action)))?;

    Ok(ApprovalAuditEntry {
        id: model.id,
        tenant_id: model.tenant_id,
        preview_id: model.preview_id,
        file_id: model.file_id,
        approved_by: model.approved_by,
        action,
        original_payload: model.original_payload,
        edited_payload: model.edited_payload,
        edited_fields_count: model.edited_fields_count,
        confidence: model.confidence,
        declared_table: model.declared_table,
        target_table: model.target_table,
        records_written: model.records_written,
        records_filtered: model.records_filtered,
        notes: model.notes,
        processing_ms: model.processing_ms,
        created_at: model.created_at,
    })
}

/// Append an audit entry. Returns its id.
pub(crate) async fn insert_audit<C: ConnectionTrait>(
    conn: &C,
    entry: NewAuditEntry,
) -> AppResult<Uuid> {
    let id = Uuid::now_v7();

    audit::ActiveModel {
        id: Set(id),
        tenant_id: Set(entry.tenant_id),
        preview_id: Set(entry.preview_id),
        file_id: Set(entry.file_id),
        approved_by: Set(entry.approved_by),
        action: Set(entry.action.as_str().to_string()),
        original_payload: Set(entry.original_payload),
        edited_payload: Set(entry.edited_payload),
        edited_fields_count: Set(entry.edited_fields_count),
        confidence: Set(entry.confidence),
        declared_table: Set(entry.declared_table),
        target_table: Set(entry.target_table),
        records_written: Set(entry.records_written),
        records_filtered: Set(entry.records_filtered),
        notes: Set(entry.notes),
        processing_ms: Set(entry.processing_ms),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to insert audit entry: {}", e)))?;

    Ok(id)
}

impl DbPool {
    /// List audit entries for a tenant, newest first.
    pub async fn list_audit_entries(
        &self,
        tenant_id: Uuid,
        query: &AuditQuery,
        page: &PaginationParams,
    ) -> AppResult<(Vec<ApprovalAuditEntry>, u64)> {
        let mut select = Audit::find().filter(audit::Column::TenantId.eq(tenant_id));
        if let Some(file_id) = query.file_id {
            select = select.filter(audit::Column::FileId.eq(file_id));
        }
        if let Some(preview_id) = query.preview_id {
            select = select.filter(audit::Column::PreviewId.eq(preview_id));
        }

        let total = select
            .clone()
            .count(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to count audit entries: {}", e)))?;

        let entries = select
            .order_by_desc(audit::Column::Id)
            .offset(page.offset())
            .limit(u64::from(page.clamped_limit()))
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list audit entries: {}", e)))?
            .into_iter()
            .map(to_domain)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((entries, total))
    }
}
