//! Uploaded document entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "uploaded_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub uploaded_by: String,
    pub original_filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_sha256: String,
    /// uploaded, parsed, extracted, failed
    pub status: String,
    pub error_message: Option<String>,
    pub attempt: i32,
    pub progress: i16,
    pub progress_message: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::extraction_job::Entity")]
    ExtractionJobs,
    #[sea_orm(has_many = "super::extraction_preview::Entity")]
    Previews,
}

impl Related<super::extraction_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExtractionJobs.def()
    }
}

impl Related<super::extraction_preview::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Previews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
