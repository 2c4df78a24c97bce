//! Approval audit entity (insert-only).

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "approval_audit")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub preview_id: Uuid,
    pub file_id: Uuid,
    pub approved_by: String,
    /// approved, edited, rejected
    pub action: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub original_payload: JsonValue,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub edited_payload: Option<JsonValue>,
    pub edited_fields_count: i32,
    pub confidence: f64,
    pub declared_table: Option<String>,
    pub target_table: Option<String>,
    pub records_written: i64,
    pub records_filtered: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub processing_ms: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::extraction_preview::Entity",
        from = "Column::PreviewId",
        to = "super::extraction_preview::Column::Id"
    )]
    Preview,
}

impl Related<super::extraction_preview::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Preview.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
