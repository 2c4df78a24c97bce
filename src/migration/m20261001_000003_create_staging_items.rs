//! Migration: Create staging_items table.
//!
//! Candidate fields and list rows awaiting review. Only review_status changes in place.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE staging_items (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    job_id UUID NOT NULL REFERENCES extraction_jobs(id) ON DELETE CASCADE,

                    -- Position within a repeating list; NULL for scalar fields
                    row_index INTEGER CHECK (row_index IS NULL OR row_index >= 0),
                    field_name VARCHAR(128) NOT NULL,
                    extracted_value TEXT NOT NULL,
                    source_snippet TEXT NOT NULL,
                    confidence DOUBLE PRECISION NOT NULL CHECK (confidence BETWEEN 0 AND 1),

                    review_status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (review_status IN ('pending', 'approved', 'rejected')),
                    reviewed_at TIMESTAMPTZ,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_staging_items_job ON staging_items(job_id, field_name, row_index);

                CREATE INDEX idx_staging_items_pending ON staging_items(tenant_id, job_id)
                    WHERE review_status = 'pending';
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS staging_items CASCADE;")
            .await?;

        Ok(())
    }
}
