//! Database queries for uploaded files and extraction attempts.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::entity::uploaded_file::{self as file, ActiveModel, Entity as File};
use crate::error::{AppError, AppResult};
use crate::models::{FileStatus, UploadedFile};

use super::DbPool;

pub(crate) fn to_domain(model: file::Model) -> AppResult<UploadedFile> {
    let status = FileStatus::parse(&model.status)
        .ok_or_else(|| AppError::Database(format!("Unknown file status '{}'", model.status)))?;

    Ok(UploadedFile {
        id: model.id,
        tenant_id: model.tenant_id,
        uploaded_by: model.uploaded_by,
        original_filename: model.original_filename,
        storage_path: model.storage_path,
        mime_type: model.mime_type,
        size_bytes: model.size_bytes,
        content_sha256: model.content_sha256,
        status,
        error_message: model.error_message,
        attempt: model.attempt,
        progress: model.progress,
        progress_message: model.progress_message,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

impl DbPool {
    /// Insert a newly uploaded file.
    pub async fn insert_file(&self, upload: &UploadedFile) -> AppResult<()> {
        let model = ActiveModel {
            id: Set(upload.id),
            tenant_id: Set(upload.tenant_id),
            uploaded_by: Set(upload.uploaded_by.clone()),
            original_filename: Set(upload.original_filename.clone()),
            storage_path: Set(upload.storage_path.clone()),
            mime_type: Set(upload.mime_type.clone()),
            size_bytes: Set(upload.size_bytes),
            content_sha256: Set(upload.content_sha256.clone()),
            status: Set(upload.status.as_str().to_string()),
            error_message: Set(upload.error_message.clone()),
            attempt: Set(upload.attempt),
            progress: Set(upload.progress),
            progress_message: Set(upload.progress_message.clone()),
            created_at: Set(upload.created_at),
            updated_at: Set(upload.updated_at),
        };

        model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert file: {}", e)))?;

        Ok(())
    }

    /// Get a file by ID within a tenant.
    pub async fn get_file(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<UploadedFile>> {
        let result = File::find_by_id(id)
            .filter(file::Column::TenantId.eq(tenant_id))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get file: {}", e)))?;

        result.map(to_domain).transpose()
    }

    /// Start a new extraction attempt unless one is already in flight.
    pub async fn begin_attempt(&self, tenant_id: Uuid, id: Uuid) -> AppResult<Option<UploadedFile>> {
        let result = File::update_many()
            .col_expr(file::Column::Status, Expr::value(FileStatus::Parsed.as_str()))
            .col_expr(file::Column::Attempt, Expr::cust("attempt + 1"))
            .col_expr(file::Column::Progress, Expr::value(0i16))
            .col_expr(
                file::Column::ProgressMessage,
                Expr::value(Some("Queued".to_string())),
            )
            .col_expr(file::Column::ErrorMessage, Expr::value(Option::<String>::None))
            .filter(file::Column::Id.eq(id))
            .filter(file::Column::TenantId.eq(tenant_id))
            .filter(file::Column::Status.ne(FileStatus::Parsed.as_str()))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin attempt: {}", e)))?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_file(tenant_id, id).await
    }

    /// Raise progress of the current attempt; never lowers it.
    pub async fn advance_progress(
        &self,
        id: Uuid,
        attempt: i32,
        progress: i16,
        message: &str,
    ) -> AppResult<bool> {
        let result = File::update_many()
            .col_expr(file::Column::Progress, Expr::value(progress))
            .col_expr(
                file::Column::ProgressMessage,
                Expr::value(Some(message.to_string())),
            )
            .filter(file::Column::Id.eq(id))
            .filter(file::Column::Attempt.eq(attempt))
            .filter(file::Column::Status.eq(FileStatus::Parsed.as_str()))
            .filter(file::Column::Progress.lt(progress))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update progress: {}", e)))?;

        Ok(result.rows_affected > 0)
    }

    /// Fail attempts stuck in flight since before `cutoff` (sweeper job).
    pub async fn fail_stale_attempts(&self, cutoff: DateTime<Utc>, message: &str) -> AppResult<u64> {
        let result = File::update_many()
            .col_expr(file::Column::Status, Expr::value(FileStatus::Failed.as_str()))
            .col_expr(
                file::Column::ErrorMessage,
                Expr::value(Some(message.to_string())),
            )
            .filter(file::Column::Status.eq(FileStatus::Parsed.as_str()))
            .filter(file::Column::UpdatedAt.lt(cutoff))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to fail stale attempts: {}", e)))?;

        Ok(result.rows_affected)
    }
}
