//! Migration: Create approval_audit table.
//!
//! Insert-only. A rule blocks updates so entries stay the ground truth of what
//! a reviewer authorized.

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
                CREATE TABLE approval_audit (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    preview_id UUID NOT NULL REFERENCES extraction_previews(id),
                    file_id UUID NOT NULL REFERENCES uploaded_files(id),
                    approved_by VARCHAR(255) NOT NULL,
                    action VARCHAR(20) NOT NULL
                        CHECK (action IN ('approved', 'edited', 'rejected')),

                    original_payload JSONB NOT NULL,
                    edited_payload JSONB,
                    edited_fields_count INTEGER NOT NULL DEFAULT 0,
                    confidence DOUBLE PRECISION NOT NULL,

                    declared_table VARCHAR(64),
                    target_table VARCHAR(64),
                    records_written BIGINT NOT NULL DEFAULT 0,
                    records_filtered BIGINT NOT NULL DEFAULT 0,

                    notes TEXT,
                    processing_ms BIGINT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_approval_audit_tenant ON approval_audit(tenant_id, created_at DESC);
                CREATE INDEX idx_approval_audit_preview ON approval_audit(preview_id);
                CREATE INDEX idx_approval_audit_file ON approval_audit(file_id);

                CREATE RULE approval_audit_no_update AS ON UPDATE TO approval_audit DO INSTEAD NOTHING;
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
                DROP RULE IF EXISTS approval_audit_no_update ON approval_audit;
                DROP TABLE IF EXISTS approval_audit CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
