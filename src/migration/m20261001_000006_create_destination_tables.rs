//! Migration: Create destination business tables.
//!
//! Each table carries a per-tenant unique natural key used by deduplication.

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
                CREATE TABLE waste_log_entries (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    source_file_id UUID REFERENCES uploaded_files(id) ON DELETE SET NULL,
                    tracking_number VARCHAR(64) NOT NULL,
                    waste_type VARCHAR(255) NOT NULL,
                    hazard_class VARCHAR(8) NOT NULL
                        CHECK (hazard_class IN ('I', 'II A', 'II B')),
                    quantity_kg DOUBLE PRECISION NOT NULL CHECK (quantity_kg > 0),
                    generated_on DATE NOT NULL,
                    disposal_method VARCHAR(255),
                    carrier VARCHAR(255),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_waste_log_entries_tracking
                    ON waste_log_entries(tenant_id, tracking_number);

                CREATE TABLE suppliers (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    source_file_id UUID REFERENCES uploaded_files(id) ON DELETE SET NULL,
                    legal_name VARCHAR(255) NOT NULL,
                    trade_name VARCHAR(255),
                    -- Digits only
                    tax_id VARCHAR(32) NOT NULL,
                    email VARCHAR(255),
                    phone VARCHAR(64),
                    category VARCHAR(128),
                    city VARCHAR(128),
                    state VARCHAR(64),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_suppliers_tax_id ON suppliers(tenant_id, tax_id);

                CREATE TABLE license_conditions (
                    id UUID PRIMARY KEY,
                    tenant_id UUID NOT NULL,
                    source_file_id UUID REFERENCES uploaded_files(id) ON DELETE SET NULL,
                    license_number VARCHAR(128) NOT NULL,
                    code VARCHAR(64) NOT NULL,
                    section_title VARCHAR(255),
                    condition_text TEXT NOT NULL,
                    category VARCHAR(128),
                    deadline_days BIGINT CHECK (deadline_days IS NULL OR deadline_days > 0),
                    due_date DATE,
                    law_refs JSONB NOT NULL DEFAULT '[]'::jsonb,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_license_conditions_key
                    ON license_conditions(tenant_id, license_number, code);
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
                DROP TABLE IF EXISTS license_conditions CASCADE;
                DROP TABLE IF EXISTS suppliers CASCADE;
                DROP TABLE IF EXISTS waste_log_entries CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}
