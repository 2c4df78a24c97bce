//! Staging item entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "staging_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub row_index: Option<i32>,
    pub field_name: String,
    #[sea_orm(column_type = "Text")]
    pub extracted_value: String,
    #[sea_orm(column_type = "Text")]
    pub source_snippet: String,
    pub confidence: f64,
    /// pending, approved, rejected
    pub review_status: String,
    pub reviewed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::extraction_job::Entity",
        from = "Column::JobId",
        to = "super::extraction_job::Column::Id",
        on_delete = "Cascade"
    )]
    Job,
}

impl Related<super::extraction_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
