//! Extraction job entity (append-only attempt history).

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "extraction_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub file_id: Uuid,
    pub attempt: i32,
    pub model: String,
    /// completed, schema_violation
    pub status: String,
    pub quality_score: Option<f64>,
    pub evidence_chars: Option<i32>,
    pub declared_table: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub raw_result: JsonValue,
    pub error_message: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::uploaded_file::Entity",
        from = "Column::FileId",
        to = "super::uploaded_file::Column::Id",
        on_delete = "Cascade"
    )]
    File,
    #[sea_orm(has_many = "super::staging_item::Entity")]
    StagingItems,
}

impl Related<super::uploaded_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::staging_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StagingItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
