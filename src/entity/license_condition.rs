//! License condition destination entity.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "license_conditions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_file_id: Option<Uuid>,
    pub license_number: String,
    pub code: String,
    pub section_title: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub condition_text: String,
    pub category: Option<String>,
    pub deadline_days: Option<i64>,
    pub due_date: Option<Date>,
    #[sea_orm(column_type = "JsonBinary")]
    pub law_refs: JsonValue,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
