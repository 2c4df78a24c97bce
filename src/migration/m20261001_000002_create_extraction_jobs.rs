//! Migration: Create extraction_jobs table.
//!
//! Append-only history of extraction attempts. Retries add rows, never update them.

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
                CREATE TABLE extraction_jobs (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    file_id UUID NOT NULL REFERENCES uploaded_files(id) ON DELETE CASCADE,
                    attempt INTEGER NOT NULL,
                    model VARCHAR(128) NOT NULL,

                    status VARCHAR(20) NOT NULL
                        CHECK (status IN ('completed', 'schema_violation', 'failed')),
                    quality_score DOUBLE PRECISION,
                    evidence_chars INTEGER,
                    declared_table VARCHAR(64),

                    -- Parsed model output, or {"raw": ...} for schema violations and failures
                    raw_result JSONB NOT NULL,
                    error_message TEXT,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_extraction_jobs_file ON extraction_jobs(tenant_id, file_id, created_at DESC);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS extraction_jobs CASCADE;")
            .await?;

        Ok(())
    }
}
