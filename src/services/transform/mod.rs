//! Record transformers: field bag in, typed destination records out.
//!
//! Untyped extracted data never reaches a destination table without passing
//! through one of these. Each transformer collects every violation across
//! all of its candidates before reporting, so the operator sees the full list.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldViolation};
use crate::models::{DestinationRecord, DestinationTable, FieldBag};

pub mod license;
pub mod supplier;
pub mod validation;
pub mod waste;

pub use license::LicenseConditionTransformer;
pub use supplier::SupplierTransformer;
pub use waste::{HazardRule, WasteLogTransformer};

/// Field name aliases accepted from extractions (English and Portuguese).
pub mod fields {
    pub const TAX_ID: &[&str] = &["tax_id", "cnpj", "cpf_cnpj", "registration_id"];
    pub const LEGAL_NAME: &[&str] = &["legal_name", "razao_social", "company_name"];
    pub const TRADE_NAME: &[&str] = &["trade_name", "nome_fantasia"];
    pub const EMAIL: &[&str] = &["email", "e_mail"];
    pub const PHONE: &[&str] = &["phone", "telefone"];
    pub const CATEGORY: &[&str] = &["category", "categoria"];
    pub const CITY: &[&str] = &["city", "cidade", "municipio"];
    pub const STATE: &[&str] = &["state", "uf", "estado"];

    pub const WASTE_TYPE: &[&str] = &["waste_type", "residuo", "waste", "description"];
    pub const QUANTITY: &[&str] = &["quantity", "quantidade", "quantity_kg", "amount"];
    pub const UNIT: &[&str] = &["unit", "unidade"];
    pub const MONTH: &[&str] = &["month", "mes", "mês", "period", "periodo"];
    pub const YEAR: &[&str] = &["year", "ano"];
    pub const DATE: &[&str] = &["date", "data", "generated_on"];
    pub const REFERENCE_YEAR: &[&str] = &["reference_year", "ano_referencia"];
    pub const MANIFEST: &[&str] = &["tracking_number", "manifest_number", "mtr", "mtr_number"];
    pub const HAZARD_CLASS: &[&str] = &["hazard_class", "classe"];
    pub const DISPOSAL: &[&str] = &["disposal_method", "destinacao", "destination"];
    pub const CARRIER: &[&str] = &["carrier", "transportador"];

    pub const LICENSE_NUMBER: &[&str] = &["license_number", "numero_licenca"];
    pub const ISSUE_DATE: &[&str] = &["issue_date", "data_emissao", "issued_on"];

    /// Canonical supplier column for an extracted field name.
    pub fn supplier_column(name: &str) -> Option<&'static str> {
        let columns: [(&'static str, &[&str]); 8] = [
            ("tax_id", TAX_ID),
            ("legal_name", LEGAL_NAME),
            ("trade_name", TRADE_NAME),
            ("email", EMAIL),
            ("phone", PHONE),
            ("category", CATEGORY),
            ("city", CITY),
            ("state", STATE),
        ];
        let name = name.trim().to_lowercase();
        columns
            .iter()
            .find(|(_, aliases)| aliases.contains(&name.as_str()))
            .map(|(column, _)| *column)
    }
}

/// Inputs a transformer may need besides the field bag.
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    /// Seeds derived identifiers so a replayed approval yields the same keys
    pub preview_id: Uuid,
    /// Fallback year and reference date
    pub today: NaiveDate,
    pub hazard_rules: &'a [HazardRule],
}

/// One implementation per destination schema.
pub trait RecordTransformer {
    fn destination(&self) -> DestinationTable;

    /// Produce candidate records, or every violation found.
    fn transform(
        &self,
        bag: &FieldBag,
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<DestinationRecord>, Vec<FieldViolation>>;
}

pub fn transformer_for(table: DestinationTable) -> Box<dyn RecordTransformer> {
    match table {
        DestinationTable::WasteLog => Box::new(WasteLogTransformer),
        DestinationTable::Supplier => Box::new(SupplierTransformer),
        DestinationTable::LicenseConditions => Box::new(LicenseConditionTransformer),
    }
}

/// Transform a field bag for `table`, failing with all validation violations.
pub fn transform(
    table: DestinationTable,
    bag: &FieldBag,
    ctx: &TransformContext<'_>,
) -> AppResult<Vec<DestinationRecord>> {
    transformer_for(table)
        .transform(bag, ctx)
        .map_err(AppError::ValidationFailed)
}
