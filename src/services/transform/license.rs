//! License condition transformer: one record per extracted condition.

use std::collections::HashSet;

use chrono::Days;
use serde_json::{Map, Value as JsonValue};

use crate::error::FieldViolation;
use crate::models::destination::{CONDITIONS, row_text};
use crate::models::{DestinationRecord, DestinationTable, FieldBag, LicenseConditionRecord};

use super::fields;
use super::validation::{FieldRule, Violations, parse_date, parse_days};
use super::{RecordTransformer, TransformContext};

fn law_refs(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(JsonValue::String(s)) => s
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Condition code of each row: the row's own code, else its 1-based
/// position, else the next number no row has claimed.
fn condition_codes(rows: &[Map<String, JsonValue>]) -> Vec<String> {
    let explicit: Vec<Option<String>> = rows.iter().map(|row| row_text(row, &["code"])).collect();
    let mut taken: HashSet<String> = explicit.iter().flatten().cloned().collect();
    let mut next = 0usize;

    explicit
        .into_iter()
        .enumerate()
        .map(|(i, code)| {
            code.unwrap_or_else(|| {
                let position = (i + 1).to_string();
                let code = if taken.contains(&position) {
                    loop {
                        next += 1;
                        let candidate = (rows.len() + next).to_string();
                        if !taken.contains(&candidate) {
                            break candidate;
                        }
                    }
                } else {
                    position
                };
                taken.insert(code.clone());
                code
            })
        })
        .collect()
}

pub struct LicenseConditionTransformer;

impl RecordTransformer for LicenseConditionTransformer {
    fn destination(&self) -> DestinationTable {
        DestinationTable::LicenseConditions
    }

    fn transform(
        &self,
        bag: &FieldBag,
        _ctx: &TransformContext<'_>,
    ) -> Result<Vec<DestinationRecord>, Vec<FieldViolation>> {
        let mut violations = Violations::new();

        let license_number = bag.first_scalar(fields::LICENSE_NUMBER);
        violations.check(0, "license_number", license_number, &[FieldRule::Required]);

        let issue_date = bag.first_scalar(fields::ISSUE_DATE);
        violations.check(0, "issue_date", issue_date, &[FieldRule::ValidDate]);
        let issue_date = issue_date.and_then(parse_date);

        let conditions = bag.rows(CONDITIONS);
        if conditions.is_empty() {
            violations.push(0, CONDITIONS, "at least one condition is required");
        }
        let codes = condition_codes(conditions);

        let mut records = Vec::with_capacity(conditions.len());
        for (i, row) in conditions.iter().enumerate() {
            let text = row_text(row, &["text"]);
            let text_ok = violations.check(
                i,
                "text",
                text.as_deref(),
                &[FieldRule::Required, FieldRule::NonEmpty],
            );

            let deadline_raw = row_text(row, &["deadline_days"]);
            let deadline_days = match deadline_raw.as_deref() {
                Some(raw) => match parse_days(raw) {
                    Some(days) => Some(days),
                    None => {
                        violations.push(
                            i,
                            "deadline_days",
                            format!("must be a positive whole number of days, got '{}'", raw),
                        );
                        continue;
                    }
                },
                None => None,
            };

            let (Some(license_number), Some(text), true) = (license_number, text, text_ok) else {
                continue;
            };

            let due_date = match (issue_date, deadline_days) {
                (Some(issued), Some(days)) => {
                    issued.checked_add_days(Days::new(days.unsigned_abs()))
                }
                _ => None,
            };

            records.push(DestinationRecord::LicenseConditions(LicenseConditionRecord {
                license_number: license_number.to_string(),
                code: codes[i].clone(),
                section_title: row_text(row, &["section_title"]),
                text,
                category: row_text(row, &["category"]),
                deadline_days,
                due_date,
                law_refs: law_refs(row.get("law_refs")),
            }));
        }

        violations.into_result(records)
    }
}
