//! Reconciliation engine: compares staged values with the persisted record and
//! resolves the operator's decision into a final field bag.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use crate::config::PipelinePolicy;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApprovalMode, AuditAction, ChangeKind, ComparisonSet, DestinationTable, ExtractionPreview,
    FieldBag, FieldComparison, RowComparison, StagingItem,
};

use super::PipelineContext;
use super::transform::fields;
use super::transform::supplier::normalize_tax_id;

/// Existing destination record the extracted scalars are compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentRecord {
    pub natural_key: String,
    /// Canonical column name to value
    pub values: BTreeMap<String, String>,
}

impl CurrentRecord {
    fn value_for(&self, field_name: &str) -> Option<&String> {
        let column = fields::supplier_column(field_name);
        column
            .and_then(|c| self.values.get(c))
            .or_else(|| self.values.get(field_name))
    }
}

/// Whitespace- and case-insensitive form used for comparisons.
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn values_match(field_name: &str, a: &str, b: &str) -> bool {
    if fields::supplier_column(field_name) == Some("tax_id") {
        normalize_tax_id(a) == normalize_tax_id(b)
    } else {
        normalize(a) == normalize(b)
    }
}

fn is_sensitive(field_name: &str, policy: &PipelinePolicy) -> bool {
    let name = field_name.trim().to_lowercase();
    policy.sensitive_fields.contains(&name)
        || fields::supplier_column(&name).is_some_and(|c| policy.sensitive_fields.contains(c))
}

/// Untyped field bag as extracted, before any operator decision.
pub fn extracted_bag(items: &[StagingItem]) -> FieldBag {
    let mut bag = FieldBag::default();
    let mut rows: Vec<&StagingItem> = Vec::new();

    for item in items {
        if item.is_row() {
            rows.push(item);
        } else {
            bag.scalars
                .insert(item.field_name.clone(), item.extracted_value.clone());
        }
    }

    rows.sort_by_key(|i| (i.field_name.clone(), i.row_index));
    for item in rows {
        if let Some(values) = row_values(item) {
            bag.rows
                .entry(item.field_name.clone())
                .or_default()
                .push(values);
        }
    }
    bag
}

fn row_values(item: &StagingItem) -> Option<Map<String, JsonValue>> {
    match serde_json::from_str::<JsonValue>(&item.extracted_value) {
        Ok(JsonValue::Object(map)) => Some(map),
        _ => None,
    }
}

/// Classify every staged value against the current record.
pub fn compare(
    items: &[StagingItem],
    current: Option<&CurrentRecord>,
    policy: &PipelinePolicy,
) -> (Vec<FieldComparison>, Vec<RowComparison>) {
    let mut fields = Vec::new();
    let mut rows = Vec::new();

    for item in items {
        let low_confidence = item.confidence < policy.min_confidence;

        if let Some(row_index) = item.row_index {
            rows.push(RowComparison {
                staging_item_id: item.id,
                list: item.field_name.clone(),
                row_index,
                values: serde_json::from_str(&item.extracted_value)
                    .unwrap_or_else(|_| JsonValue::String(item.extracted_value.clone())),
                confidence: item.confidence,
                source_snippet: item.source_snippet.clone(),
                change: ChangeKind::New,
                needs_confirmation: low_confidence,
            });
            continue;
        }

        let current_value = current.and_then(|c| c.value_for(&item.field_name)).cloned();
        let change = match &current_value {
            None => ChangeKind::New,
            Some(current) if values_match(&item.field_name, current, &item.extracted_value) => {
                ChangeKind::Unchanged
            }
            Some(_)
                if item.confidence < policy.conflict_confidence
                    || is_sensitive(&item.field_name, policy) =>
            {
                ChangeKind::Conflict
            }
            Some(_) => ChangeKind::Modified,
        };

        fields.push(FieldComparison {
            staging_item_id: item.id,
            field_name: item.field_name.clone(),
            extracted_value: item.extracted_value.clone(),
            current_value,
            confidence: item.confidence,
            source_snippet: item.source_snippet.clone(),
            change,
            needs_confirmation: change == ChangeKind::Conflict
                || (change != ChangeKind::Unchanged && low_confidence),
        });
    }

    rows.sort_by(|a, b| (&a.list, a.row_index).cmp(&(&b.list, b.row_index)));
    (fields, rows)
}

pub fn build_comparison(
    preview: &ExtractionPreview,
    items: &[StagingItem],
    current: Option<&CurrentRecord>,
    policy: &PipelinePolicy,
) -> ComparisonSet {
    let (fields, rows) = compare(items, current, policy);
    ComparisonSet {
        preview_id: preview.id,
        file_id: preview.file_id,
        job_id: preview.job_id,
        declared_table: preview.declared_table.clone(),
        confidence: preview.confidence,
        status: preview.status,
        matched_record: current.map(|c| c.natural_key.clone()),
        fields,
        rows,
    }
}

/// Look up the record the extraction describes, when it carries a natural key.
///
/// Only suppliers are addressable before classification (by tax id).
async fn current_record(
    ctx: &PipelineContext,
    tenant_id: Uuid,
    items: &[StagingItem],
) -> AppResult<Option<CurrentRecord>> {
    let bag = extracted_bag(items);
    let Some(tax_id) = bag
        .first_scalar(fields::TAX_ID)
        .map(normalize_tax_id)
        .filter(|t| !t.is_empty())
    else {
        return Ok(None);
    };

    let values = ctx
        .store
        .find_current_record(tenant_id, DestinationTable::Supplier, &tax_id)
        .await?;
    Ok(values.map(|values| CurrentRecord {
        natural_key: tax_id,
        values,
    }))
}

/// A preview with its staged items and derived comparison.
#[derive(Debug, Clone)]
pub struct Review {
    pub preview: ExtractionPreview,
    pub items: Vec<StagingItem>,
    pub comparison: ComparisonSet,
}

pub async fn load_review(
    ctx: &PipelineContext,
    tenant_id: Uuid,
    preview_id: Uuid,
) -> AppResult<Review> {
    let preview = ctx
        .store
        .get_preview(tenant_id, preview_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Preview {}", preview_id)))?;

    let items = ctx
        .store
        .staging_items_for_job(tenant_id, preview.job_id)
        .await?;
    let current = current_record(ctx, tenant_id, &items).await?;
    let comparison = build_comparison(&preview, &items, current.as_ref(), &ctx.policy);

    debug!(
        preview_id = %preview_id,
        fields = comparison.fields.len(),
        rows = comparison.rows.len(),
        conflicts = comparison.conflict_count(),
        "Built comparison set"
    );

    Ok(Review {
        preview,
        items,
        comparison,
    })
}

/// Final outcome of an operator decision over a comparison set.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub bag: FieldBag,
    pub approved_items: Vec<Uuid>,
    pub rejected_items: Vec<Uuid>,
    /// Edits whose value differs from what was extracted
    pub edited_fields_count: u32,
    pub edited_payload: Option<JsonValue>,
    pub action: AuditAction,
}

/// Split `conditions[2]` into (`conditions`, 2).
fn parse_row_key(key: &str) -> Option<(&str, i32)> {
    let (list, rest) = key.split_once('[')?;
    let index = rest.strip_suffix(']')?.trim().parse().ok()?;
    Some((list.trim(), index))
}

/// Read a scalar edit. `null` removes the field.
fn scalar_edit(key: &str, value: &JsonValue) -> AppResult<Option<String>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) if s.trim().is_empty() => Ok(None),
        JsonValue::String(s) => Ok(Some(s.trim().to_string())),
        JsonValue::Number(n) => Ok(Some(n.to_string())),
        JsonValue::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(AppError::InvalidInput(format!(
            "Edited value for '{}' must be a scalar",
            key
        ))),
    }
}

/// Apply the approval mode and edits to a comparison set.
///
/// Edits are keyed by field name, or by `list[index]` for a whole row, and
/// apply on top of either mode. Unknown scalar keys add a field.
pub fn resolve(
    set: &ComparisonSet,
    mode: ApprovalMode,
    edits: &BTreeMap<String, JsonValue>,
) -> AppResult<Resolution> {
    let include = |needs_confirmation: bool| match mode {
        ApprovalMode::AcceptAll => true,
        ApprovalMode::AcceptNonConflicting => !needs_confirmation,
    };

    let mut bag = FieldBag::default();
    let mut approved_items = Vec::new();
    let mut rejected_items = Vec::new();
    let mut edited = 0u32;

    for field in &set.fields {
        match edits.get(&field.field_name) {
            Some(edit) => match scalar_edit(&field.field_name, edit)? {
                Some(value) => {
                    if normalize(&value) != normalize(&field.extracted_value) {
                        edited += 1;
                    }
                    bag.scalars.insert(field.field_name.clone(), value);
                    approved_items.push(field.staging_item_id);
                }
                None => {
                    edited += 1;
                    rejected_items.push(field.staging_item_id);
                }
            },
            None if include(field.needs_confirmation) => {
                bag.scalars
                    .insert(field.field_name.clone(), field.extracted_value.clone());
                approved_items.push(field.staging_item_id);
            }
            None => rejected_items.push(field.staging_item_id),
        }
    }

    for row in &set.rows {
        let key = row.edit_key();
        let values = match edits.get(&key) {
            Some(JsonValue::Object(map)) => {
                if JsonValue::Object(map.clone()) != row.values {
                    edited += 1;
                }
                Some(map.clone())
            }
            Some(JsonValue::Null) => {
                edited += 1;
                None
            }
            Some(_) => {
                return Err(AppError::InvalidInput(format!(
                    "Edited row '{}' must be an object or null",
                    key
                )));
            }
            None if include(row.needs_confirmation) => row.values.as_object().cloned(),
            None => None,
        };

        match values {
            Some(values) => {
                bag.rows.entry(row.list.clone()).or_default().push(values);
                approved_items.push(row.staging_item_id);
            }
            None => rejected_items.push(row.staging_item_id),
        }
    }

    for (key, value) in edits {
        let known = set.fields.iter().any(|f| &f.field_name == key)
            || set.rows.iter().any(|r| &r.edit_key() == key);
        if known {
            continue;
        }
        if let Some((list, index)) = parse_row_key(key) {
            return Err(AppError::InvalidInput(format!(
                "No row {} in list '{}'",
                index, list
            )));
        }
        if let Some(value) = scalar_edit(key, value)? {
            bag.scalars.insert(key.clone(), value);
            edited += 1;
        }
    }

    Ok(Resolution {
        bag,
        approved_items,
        rejected_items,
        edited_fields_count: edited,
        edited_payload: (!edits.is_empty()).then(|| {
            JsonValue::Object(edits.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }),
        action: if edited > 0 {
            AuditAction::Edited
        } else {
            AuditAction::Approved
        },
    })
}
