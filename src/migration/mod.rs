//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_uploaded_files;
mod m20261001_000002_create_extraction_jobs;
mod m20261001_000003_create_staging_items;
mod m20261001_000004_create_extraction_previews;
mod m20261001_000005_create_approval_audit;
mod m20261001_000006_create_destination_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_uploaded_files::Migration),
            Box::new(m20261001_000002_create_extraction_jobs::Migration),
            Box::new(m20261001_000003_create_staging_items::Migration),
            Box::new(m20261001_000004_create_extraction_previews::Migration),
            Box::new(m20261001_000005_create_approval_audit::Migration),
            Box::new(m20261001_000006_create_destination_tables::Migration),
        ]
    }
}
