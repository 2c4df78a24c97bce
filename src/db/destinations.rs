//! Database queries for destination business tables.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set};
use uuid::Uuid;

use crate::entity::{license_condition, supplier, waste_log_entry};
use crate::error::{AppError, AppResult};
use crate::models::destination::license_condition_key;
use crate::models::{DestinationRecord, DestinationTable, MAX_TRACKING_REISSUES};

use super::DbPool;

/// Insert a record unless its natural key already exists. Returns whether a
/// row was written.
pub(crate) async fn insert_record<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    file_id: Uuid,
    record: &DestinationRecord,
) -> AppResult<bool> {
    let now = Utc::now();

    let rows = match record {
        DestinationRecord::WasteLog(r) => {
            let model = waste_log_entry::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(tenant_id),
                source_file_id: Set(Some(file_id)),
                tracking_number: Set(r.tracking_number.clone()),
                waste_type: Set(r.waste_type.clone()),
                hazard_class: Set(r.hazard_class.as_str().to_string()),
                quantity_kg: Set(r.quantity_kg),
                generated_on: Set(r.generated_on),
                disposal_method: Set(r.disposal_method.clone()),
                carrier: Set(r.carrier.clone()),
                created_at: Set(now),
            };
            waste_log_entry::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        waste_log_entry::Column::TenantId,
                        waste_log_entry::Column::TrackingNumber,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await
        }
        DestinationRecord::Supplier(r) => {
            let model = supplier::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(tenant_id),
                source_file_id: Set(Some(file_id)),
                legal_name: Set(r.legal_name.clone()),
                trade_name: Set(r.trade_name.clone()),
                tax_id: Set(r.tax_id.clone()),
                email: Set(r.email.clone()),
                phone: Set(r.phone.clone()),
                category: Set(r.category.clone()),
                city: Set(r.city.clone()),
                state: Set(r.state.clone()),
                created_at: Set(now),
            };
            supplier::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([supplier::Column::TenantId, supplier::Column::TaxId])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(conn)
                .await
        }
        DestinationRecord::LicenseConditions(r) => {
            let model = license_condition::ActiveModel {
                id: Set(Uuid::now_v7()),
                tenant_id: Set(tenant_id),
                source_file_id: Set(Some(file_id)),
                license_number: Set(r.license_number.clone()),
                code: Set(r.code.clone()),
                section_title: Set(r.section_title.clone()),
                condition_text: Set(r.text.clone()),
                category: Set(r.category.clone()),
                deadline_days: Set(r.deadline_days),
                due_date: Set(r.due_date),
                law_refs: Set(serde_json::json!(r.law_refs)),
                created_at: Set(now),
            };
            license_condition::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        license_condition::Column::TenantId,
                        license_condition::Column::LicenseNumber,
                        license_condition::Column::Code,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await
        }
    }
    .map_err(|e| {
        AppError::Database(format!(
            "Failed to insert {} record: {}",
            record.table(),
            e
        ))
    })?;

    Ok(rows > 0)
}

/// Insert a record, reissuing a generated tracking number that another
/// file's entry already holds. Returns whether a row was written.
pub(crate) async fn insert_record_reissuing<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    file_id: Uuid,
    mut record: DestinationRecord,
) -> AppResult<bool> {
    for _ in 0..=MAX_TRACKING_REISSUES {
        if insert_record(conn, tenant_id, file_id, &record).await? {
            return Ok(true);
        }
        let Some(number) = record.generated_tracking_number() else {
            return Ok(false);
        };

        let holder: Option<Option<Uuid>> = waste_log_entry::Entity::find()
            .select_only()
            .column(waste_log_entry::Column::SourceFileId)
            .filter(waste_log_entry::Column::TenantId.eq(tenant_id))
            .filter(waste_log_entry::Column::TrackingNumber.eq(number))
            .into_tuple()
            .one(conn)
            .await?;
        // Same document approved again
        if holder == Some(Some(file_id)) {
            return Ok(false);
        }
        record.reissue_tracking_number();
    }

    Err(AppError::Conflict(format!(
        "No free tracking number after {} attempts",
        MAX_TRACKING_REISSUES
    )))
}

impl DbPool {
    /// Source file of each waste entry holding one of `numbers`.
    pub async fn tracking_number_sources(
        &self,
        tenant_id: Uuid,
        numbers: &[String],
    ) -> AppResult<HashMap<String, Option<Uuid>>> {
        if numbers.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(String, Option<Uuid>)> = waste_log_entry::Entity::find()
            .select_only()
            .column(waste_log_entry::Column::TrackingNumber)
            .column(waste_log_entry::Column::SourceFileId)
            .filter(waste_log_entry::Column::TenantId.eq(tenant_id))
            .filter(waste_log_entry::Column::TrackingNumber.is_in(numbers.iter().cloned()))
            .into_tuple()
            .all(self.connection())
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// Natural keys from `keys` already present for the tenant.
    pub async fn existing_natural_keys(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        keys: &[String],
    ) -> AppResult<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> = match table {
            DestinationTable::WasteLog => waste_log_entry::Entity::find()
                .select_only()
                .column(waste_log_entry::Column::TrackingNumber)
                .filter(waste_log_entry::Column::TenantId.eq(tenant_id))
                .filter(waste_log_entry::Column::TrackingNumber.is_in(keys.iter().cloned()))
                .into_tuple()
                .all(self.connection())
                .await?,
            DestinationTable::Supplier => supplier::Entity::find()
                .select_only()
                .column(supplier::Column::TaxId)
                .filter(supplier::Column::TenantId.eq(tenant_id))
                .filter(supplier::Column::TaxId.is_in(keys.iter().cloned()))
                .into_tuple()
                .all(self.connection())
                .await?,
            DestinationTable::LicenseConditions => {
                let licenses: HashSet<&str> = keys
                    .iter()
                    .filter_map(|k| k.split_once('#').map(|(license, _)| license))
                    .collect();
                let pairs: Vec<(String, String)> = license_condition::Entity::find()
                    .select_only()
                    .column(license_condition::Column::LicenseNumber)
                    .column(license_condition::Column::Code)
                    .filter(license_condition::Column::TenantId.eq(tenant_id))
                    .filter(
                        license_condition::Column::LicenseNumber
                            .is_in(licenses.into_iter().map(str::to_string)),
                    )
                    .into_tuple()
                    .all(self.connection())
                    .await?;
                pairs
                    .iter()
                    .map(|(license, code)| license_condition_key(license, code))
                    .collect()
            }
        };

        let wanted: HashSet<&String> = keys.iter().collect();
        Ok(found.into_iter().filter(|k| wanted.contains(k)).collect())
    }

    /// Current field values of an existing record.
    ///
    /// Only suppliers are reconciled field by field; the other destinations
    /// are row-based and always compare as new rows.
    pub async fn find_current_record(
        &self,
        tenant_id: Uuid,
        table: DestinationTable,
        natural_key: &str,
    ) -> AppResult<Option<BTreeMap<String, String>>> {
        if table != DestinationTable::Supplier {
            return Ok(None);
        }

        let found = supplier::Entity::find()
            .filter(supplier::Column::TenantId.eq(tenant_id))
            .filter(supplier::Column::TaxId.eq(natural_key))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get supplier: {}", e)))?;

        Ok(found.map(supplier_fields))
    }
}

fn supplier_fields(model: supplier::Model) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("legal_name".to_string(), model.legal_name);
    fields.insert("tax_id".to_string(), model.tax_id);
    let optional = [
        ("trade_name", model.trade_name),
        ("email", model.email),
        ("phone", model.phone),
        ("category", model.category),
        ("city", model.city),
        ("state", model.state),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            fields.insert(name.to_string(), value);
        }
    }
    fields
}
