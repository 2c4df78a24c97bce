//! Migration: Create uploaded_files table.
//!
//! One row per uploaded document; status and progress reflect the latest
//! extraction attempt.

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
                -- Function to automatically update updated_at timestamp
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE uploaded_files (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    tenant_id UUID NOT NULL,
                    uploaded_by VARCHAR(255) NOT NULL,
                    original_filename VARCHAR(255) NOT NULL,

                    -- Write-once object key: tenants/{tenant}/files/{id}/{sha256}/{name}
                    storage_path VARCHAR(1024) NOT NULL,
                    mime_type VARCHAR(128) NOT NULL,
                    size_bytes BIGINT NOT NULL CHECK (size_bytes > 0),
                    content_sha256 CHAR(64) NOT NULL,

                    status VARCHAR(20) NOT NULL DEFAULT 'uploaded'
                        CHECK (status IN ('uploaded', 'parsed', 'extracted', 'failed')),
                    error_message TEXT,

                    -- Attempt tracking (progress is monotonic within an attempt)
                    attempt INTEGER NOT NULL DEFAULT 0,
                    progress SMALLINT NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
                    progress_message VARCHAR(255),

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_uploaded_files_tenant ON uploaded_files(tenant_id, created_at DESC);

                -- Sweeper lookup for attempts stuck in flight
                CREATE INDEX idx_uploaded_files_in_flight ON uploaded_files(updated_at)
                    WHERE status = 'parsed';

                CREATE TRIGGER update_uploaded_files_updated_at
                    BEFORE UPDATE ON uploaded_files
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
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
                DROP TRIGGER IF EXISTS update_uploaded_files_updated_at ON uploaded_files;
                DROP TABLE IF EXISTS uploaded_files CASCADE;
                DROP FUNCTION IF EXISTS update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }
}
