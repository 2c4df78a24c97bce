//! Migration: Create extraction_previews and extraction_logs tables.

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
                CREATE TABLE extraction_previews (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    file_id UUID NOT NULL REFERENCES uploaded_files(id) ON DELETE CASCADE,
                    job_id UUID NOT NULL UNIQUE REFERENCES extraction_jobs(id) ON DELETE CASCADE,
                    declared_table VARCHAR(64),
                    confidence DOUBLE PRECISION NOT NULL,

                    -- Terminal once resolved
                    status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'approved', 'rejected')),
                    resolved_at TIMESTAMPTZ,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_extraction_previews_file ON extraction_previews(tenant_id, file_id, created_at DESC);

                -- Immutable operational log of extraction decisions
                CREATE TABLE extraction_logs (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    file_id UUID NOT NULL REFERENCES uploaded_files(id) ON DELETE CASCADE,
                    job_id UUID REFERENCES extraction_jobs(id) ON DELETE SET NULL,
                    outcome VARCHAR(32) NOT NULL
                        CHECK (outcome IN ('accepted', 'quality_gate_failed')),
                    confidence DOUBLE PRECISION NOT NULL,
                    evidence_chars INTEGER NOT NULL,
                    model VARCHAR(128) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_extraction_logs_file ON extraction_logs(tenant_id, file_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TABLE IF EXISTS extraction_logs CASCADE;
                DROP TABLE IF EXISTS extraction_previews CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
