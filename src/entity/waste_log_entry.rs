//! Waste log destination entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "waste_log_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_file_id: Option<Uuid>,
    /// Natural key, unique per tenant
    pub tracking_number: String,
    pub waste_type: String,
    pub hazard_class: String,
    pub quantity_kg: f64,
    pub generated_on: Date,
    pub disposal_method: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
