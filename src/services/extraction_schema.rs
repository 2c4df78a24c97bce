//! Versioned output contract of the AI extraction and its strict parser.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::error::{AppError, AppResult};
use crate::models::NewStagingItem;
use crate::models::destination::{CONDITIONS, LINE_ITEMS};

/// Bump whenever the output schema changes shape.
pub const SCHEMA_VERSION: &str = "esg-extraction/3";

/// Instruction set sent with every extraction.
pub const INSTRUCTIONS: &str = "\
Extract structured ESG data from the attached document.
Only report values that are literally present in the document. Never infer, \
complete or invent a field; omit anything you cannot quote.
For every value, copy the exact source text it was read from into source_snippet \
and give your confidence between 0 and 1.
Report each license condition and each table row as its own entry.
Set target_table to one of waste_log, supplier or license_conditions when the \
document clearly belongs to one of them.
Set _evidence_chars to the number of characters of document text you could read.";

/// JSON schema the model output must satisfy.
pub fn output_schema() -> JsonValue {
    let snippet = json!({ "type": "string", "minLength": 1 });
    let confidence = json!({ "type": "number", "minimum": 0, "maximum": 1 });

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["confidence", "_evidence_chars"],
        "properties": {
            "document_type": { "type": ["string", "null"] },
            "target_table": {
                "type": ["string", "null"],
                "enum": ["waste_log", "supplier", "license_conditions", null]
            },
            "confidence": confidence,
            "_evidence_chars": { "type": "integer", "minimum": 0 },
            "fields": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["name", "value", "source_snippet", "confidence"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 },
                        "value": { "type": ["string", "number", "boolean", "null"] },
                        "source_snippet": snippet,
                        "confidence": confidence
                    }
                }
            },
            "conditions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["text", "source_snippet", "confidence"],
                    "properties": {
                        "code": { "type": ["string", "null"] },
                        "section_title": { "type": ["string", "null"] },
                        "text": { "type": "string", "minLength": 1 },
                        "category": { "type": ["string", "null"] },
                        "deadline_days": { "type": ["integer", "null"] },
                        "law_refs": { "type": "array", "items": { "type": "string" } },
                        "source_snippet": snippet,
                        "confidence": confidence
                    }
                }
            },
            "line_items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["values", "source_snippet", "confidence"],
                    "properties": {
                        "values": { "type": "object" },
                        "source_snippet": snippet,
                        "confidence": confidence
                    }
                }
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedField {
    pub name: String,
    pub value: JsonValue,
    pub source_snippet: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedCondition {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub section_title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub deadline_days: Option<i64>,
    #[serde(default)]
    pub law_refs: Vec<String>,
    pub source_snippet: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedRow {
    pub values: Map<String, JsonValue>,
    pub source_snippet: String,
    pub confidence: f64,
}

/// Parsed model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelExtraction {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub target_table: Option<String>,
    pub confidence: f64,
    #[serde(rename = "_evidence_chars")]
    pub evidence_chars: i64,
    #[serde(default)]
    pub fields: Vec<ExtractedField>,
    #[serde(default)]
    pub conditions: Vec<ExtractedCondition>,
    #[serde(default)]
    pub line_items: Vec<ExtractedRow>,
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn check_confidence(value: f64, what: &str) -> Result<(), String> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} confidence {} is outside [0, 1]", what, value))
    }
}

fn check_snippet(snippet: &str, what: &str) -> Result<(), String> {
    if snippet.trim().is_empty() {
        Err(format!("{} has no source snippet", what))
    } else {
        Ok(())
    }
}

impl ModelExtraction {
    /// Parse model output strictly. Any deviation is a schema violation.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let body = strip_code_fence(raw);
        let parsed: ModelExtraction = serde_json::from_str(body)
            .map_err(|e| AppError::SchemaViolation(format!("Unparseable output: {}", e)))?;
        parsed.validate().map_err(AppError::SchemaViolation)?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), String> {
        check_confidence(self.confidence, "Document")?;
        if self.evidence_chars < 0 {
            return Err("_evidence_chars must not be negative".to_string());
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            let name = field.name.trim();
            if name.is_empty() {
                return Err("Field with empty name".to_string());
            }
            if !names.insert(name.to_lowercase()) {
                return Err(format!("Field '{}' reported twice", name));
            }
            if name == CONDITIONS || name == LINE_ITEMS {
                return Err(format!("Field name '{}' is reserved", name));
            }
            if field.value.is_object() || field.value.is_array() {
                return Err(format!("Field '{}' must be a scalar", name));
            }
            check_confidence(field.confidence, &format!("Field '{}'", name))?;
            check_snippet(&field.source_snippet, &format!("Field '{}'", name))?;
        }

        for (i, condition) in self.conditions.iter().enumerate() {
            if condition.text.trim().is_empty() {
                return Err(format!("Condition {} has no text", i));
            }
            check_confidence(condition.confidence, &format!("Condition {}", i))?;
            check_snippet(&condition.source_snippet, &format!("Condition {}", i))?;
        }

        for (i, row) in self.line_items.iter().enumerate() {
            if row.values.is_empty() {
                return Err(format!("Line item {} has no values", i));
            }
            check_confidence(row.confidence, &format!("Line item {}", i))?;
            check_snippet(&row.source_snippet, &format!("Line item {}", i))?;
        }

        Ok(())
    }

    /// Evidence size clamped into the stored integer range.
    pub fn evidence_chars_i32(&self) -> i32 {
        i32::try_from(self.evidence_chars).unwrap_or(i32::MAX)
    }

    /// One staging item per scalar field and one per list element.
    pub fn staging_items(&self) -> Vec<NewStagingItem> {
        let mut items = Vec::new();

        for field in &self.fields {
            let value = match &field.value {
                JsonValue::Null => continue,
                JsonValue::String(s) if s.trim().is_empty() => continue,
                JsonValue::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            items.push(NewStagingItem {
                row_index: None,
                field_name: field.name.trim().to_string(),
                extracted_value: value,
                source_snippet: field.source_snippet.clone(),
                confidence: field.confidence,
            });
        }

        for (i, condition) in self.conditions.iter().enumerate() {
            let values = json!({
                "code": condition.code,
                "section_title": condition.section_title,
                "text": condition.text.trim(),
                "category": condition.category,
                "deadline_days": condition.deadline_days,
                "law_refs": condition.law_refs,
            });
            items.push(NewStagingItem {
                row_index: Some(i as i32),
                field_name: CONDITIONS.to_string(),
                extracted_value: values.to_string(),
                source_snippet: condition.source_snippet.clone(),
                confidence: condition.confidence,
            });
        }

        for (i, row) in self.line_items.iter().enumerate() {
            items.push(NewStagingItem {
                row_index: Some(i as i32),
                field_name: LINE_ITEMS.to_string(),
                extracted_value: JsonValue::Object(row.values.clone()).to_string(),
                source_snippet: row.source_snippet.clone(),
                confidence: row.confidence,
            });
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LICENSE_OUTPUT: &str = r#"```json
{
  "document_type": "operating_license",
  "target_table": "license_conditions",
  "confidence": 0.86,
  "_evidence_chars": 5120,
  "fields": [
    {"name": "license_number", "value": "LO-1234/2024", "source_snippet": "Licença de Operação nº LO-1234/2024", "confidence": 0.97},
    {"name": "validity_years", "value": 4, "source_snippet": "válida por 4 anos", "confidence": 0.9},
    {"name": "issuer", "value": null, "source_snippet": "-", "confidence": 0.1}
  ],
  "conditions": [
    {"code": "1", "text": "Apresentar relatório de automonitoramento", "deadline_days": 180, "law_refs": ["CONAMA 430"], "source_snippet": "1. Apresentar relatório", "confidence": 0.8},
    {"code": "2", "text": "Manter sistema de drenagem", "source_snippet": "2. Manter sistema", "confidence": 0.75},
    {"code": "3", "text": "Destinar resíduos classe I", "source_snippet": "3. Destinar resíduos", "confidence": 0.6}
  ]
}
```"#;

    #[test]
    fn test_parse_fenced_output() {
        let parsed = ModelExtraction::parse(LICENSE_OUTPUT).unwrap();
        assert_eq!(parsed.target_table.as_deref(), Some("license_conditions"));
        assert_eq!(parsed.evidence_chars, 5120);
        assert_eq!(parsed.conditions.len(), 3);
    }

    #[test]
    fn test_each_condition_becomes_its_own_item() {
        let parsed = ModelExtraction::parse(LICENSE_OUTPUT).unwrap();
        let items = parsed.staging_items();

        let conditions: Vec<_> = items.iter().filter(|i| i.field_name == CONDITIONS).collect();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[2].row_index, Some(2));
        assert_eq!(conditions[2].confidence, 0.6);
        assert_eq!(conditions[2].source_snippet, "3. Destinar resíduos");

        // null scalar skipped, number stringified
        let scalars: Vec<_> = items.iter().filter(|i| i.row_index.is_none()).collect();
        assert_eq!(scalars.len(), 2);
        assert!(
            scalars
                .iter()
                .any(|i| i.field_name == "validity_years" && i.extracted_value == "4")
        );
    }

    #[test]
    fn test_unknown_keys_are_violations() {
        let raw = r#"{"confidence": 0.9, "_evidence_chars": 300, "summary": "x"}"#;
        assert!(matches!(
            ModelExtraction::parse(raw),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_missing_snippet_is_violation() {
        let raw = r#"{"confidence": 0.9, "_evidence_chars": 300,
            "fields": [{"name": "tax_id", "value": "1", "source_snippet": " ", "confidence": 0.9}]}"#;
        assert!(matches!(
            ModelExtraction::parse(raw),
            Err(AppError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_out_of_range_confidence_is_violation() {
        let raw = r#"{"confidence": 1.4, "_evidence_chars": 300}"#;
        assert!(ModelExtraction::parse(raw).is_err());
    }

    #[test]
    fn test_duplicate_field_is_violation() {
        let raw = r#"{"confidence": 0.9, "_evidence_chars": 300, "fields": [
            {"name": "city", "value": "A", "source_snippet": "A", "confidence": 0.9},
            {"name": "City", "value": "B", "source_snippet": "B", "confidence": 0.9}]}"#;
        assert!(ModelExtraction::parse(raw).is_err());
    }

    #[test]
    fn test_prose_is_violation() {
        assert!(ModelExtraction::parse("I could not read this document.").is_err());
    }

    #[test]
    fn test_schema_is_versioned_object() {
        let schema = output_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["_evidence_chars"].is_object());
    }
}
