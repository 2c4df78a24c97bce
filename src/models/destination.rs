//! Destination schemas and the untyped field bag that feeds them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// Repeating list names carried by an extraction.
pub const CONDITIONS: &str = "conditions";
pub const LINE_ITEMS: &str = "line_items";

/// Business table a field set is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DestinationTable {
    WasteLog,
    Supplier,
    LicenseConditions,
}

impl DestinationTable {
    pub const ALL: [DestinationTable; 3] = [
        DestinationTable::WasteLog,
        DestinationTable::Supplier,
        DestinationTable::LicenseConditions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WasteLog => "waste_log",
            Self::Supplier => "supplier",
            Self::LicenseConditions => "license_conditions",
        }
    }

    /// Lenient parse of a table name as declared by the model.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "waste_log" | "waste_logs" | "waste_log_entries" | "residuos" => Some(Self::WasteLog),
            "supplier" | "suppliers" | "fornecedores" => Some(Self::Supplier),
            "license_conditions" | "license_condition" | "licenses" | "licencas" => {
                Some(Self::LicenseConditions)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for DestinationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Untyped extracted data: scalar fields plus repeating row lists.
///
/// Never written to a destination directly; it must first be classified and
/// transformed into a [`DestinationRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldBag {
    pub scalars: BTreeMap<String, String>,
    #[schema(value_type = Object)]
    pub rows: BTreeMap<String, Vec<Map<String, JsonValue>>>,
}

impl FieldBag {
    /// Non-blank scalar value, trimmed.
    pub fn scalar(&self, name: &str) -> Option<&str> {
        self.scalars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-blank scalar among several aliases.
    pub fn first_scalar(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.scalar(name))
    }

    pub fn has_any_scalar(&self, names: &[&str]) -> bool {
        self.first_scalar(names).is_some()
    }

    pub fn rows(&self, list: &str) -> &[Map<String, JsonValue>] {
        self.rows.get(list).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.rows.values().all(Vec::is_empty)
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Read a row value as trimmed text, accepting strings and numbers.
pub fn row_text(row: &Map<String, JsonValue>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match row.get(*name)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Waste hazard class (NBR 10004 style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HazardClass {
    /// Dangerous waste
    #[serde(rename = "I")]
    ClassI,
    /// Non-inert waste
    #[serde(rename = "II A")]
    ClassIIA,
    /// Inert / recyclable waste
    #[serde(rename = "II B")]
    ClassIIB,
}

impl HazardClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassI => "I",
            Self::ClassIIA => "II A",
            Self::ClassIIB => "II B",
        }
    }
}

/// Attempts at finding a free generated tracking number before giving up.
pub const MAX_TRACKING_REISSUES: u32 = 16;

/// Inputs of a generated tracking number.
///
/// The same preview row always yields the same number, so approving a
/// preview twice is caught by deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingSeed {
    pub preview_id: Uuid,
    pub row: usize,
    pub salt: u32,
}

impl TrackingSeed {
    pub fn new(preview_id: Uuid, row: usize) -> Self {
        Self {
            preview_id,
            row,
            salt: 0,
        }
    }

    /// `MTR-YYYYMM-` and 64 bits of digest, e.g. `MTR-202403-4F1A9C0B77D2E513`.
    pub fn number(&self, generated_on: NaiveDate) -> String {
        let digest =
            Sha256::digest(format!("{}:{}:{}", self.preview_id, self.row, self.salt).as_bytes());
        format!(
            "MTR-{}-{}",
            generated_on.format("%Y%m"),
            hex::encode_upper(&digest[..8])
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WasteLogRecord {
    pub tracking_number: String,
    pub waste_type: String,
    pub hazard_class: HazardClass,
    pub quantity_kg: f64,
    pub generated_on: NaiveDate,
    pub disposal_method: Option<String>,
    pub carrier: Option<String>,
    /// Set when the number was generated rather than read from the document
    #[serde(skip)]
    pub tracking_seed: Option<TrackingSeed>,
}

impl WasteLogRecord {
    /// Move a generated tracking number to its next candidate.
    ///
    /// Returns `false` for numbers taken from the document, which are kept.
    pub fn reissue_tracking_number(&mut self) -> bool {
        match self.tracking_seed.as_mut() {
            Some(seed) => {
                seed.salt += 1;
                self.tracking_number = seed.number(self.generated_on);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierRecord {
    pub legal_name: String,
    pub trade_name: Option<String>,
    /// Digits only
    pub tax_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseConditionRecord {
    pub license_number: String,
    pub code: String,
    pub section_title: Option<String>,
    pub text: String,
    pub category: Option<String>,
    pub deadline_days: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub law_refs: Vec<String>,
}

/// Strongly typed record ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum DestinationRecord {
    WasteLog(WasteLogRecord),
    Supplier(SupplierRecord),
    LicenseConditions(LicenseConditionRecord),
}

impl DestinationRecord {
    pub fn table(&self) -> DestinationTable {
        match self {
            Self::WasteLog(_) => DestinationTable::WasteLog,
            Self::Supplier(_) => DestinationTable::Supplier,
            Self::LicenseConditions(_) => DestinationTable::LicenseConditions,
        }
    }

    /// Generated tracking number of a waste entry, if any.
    pub fn generated_tracking_number(&self) -> Option<&str> {
        match self {
            Self::WasteLog(r) if r.tracking_seed.is_some() => Some(&r.tracking_number),
            _ => None,
        }
    }

    /// See [`WasteLogRecord::reissue_tracking_number`]; `false` for other tables.
    pub fn reissue_tracking_number(&mut self) -> bool {
        match self {
            Self::WasteLog(r) => r.reissue_tracking_number(),
            _ => false,
        }
    }

    /// Business-meaningful unique key used for deduplication.
    pub fn natural_key(&self) -> String {
        match self {
            Self::WasteLog(r) => r.tracking_number.clone(),
            Self::Supplier(r) => r.tax_id.clone(),
            Self::LicenseConditions(r) => license_condition_key(&r.license_number, &r.code),
        }
    }
}

/// Natural key of a license condition.
pub fn license_condition_key(license_number: &str, code: &str) -> String {
    format!("{}#{}", license_number.trim(), code.trim())
}
