//! SeaORM entity definitions for PostgreSQL database.

pub mod approval_audit;
pub mod extraction_job;
pub mod extraction_log;
pub mod extraction_preview;
pub mod license_condition;
pub mod staging_item;
pub mod supplier;
pub mod uploaded_file;
pub mod waste_log_entry;
