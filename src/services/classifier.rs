//! Target classifier: decides which destination a final field bag belongs to.
//!
//! The table declared by the extraction is advisory. Rules are evaluated in
//! order against the bag and the first match wins; the declared table is only
//! used when no rule matches.

use tracing::warn;

use crate::error::{AppError, AppResult, FieldViolation};
use crate::models::destination::{CONDITIONS, LINE_ITEMS, row_text};
use crate::models::{DestinationTable, FieldBag};

use super::transform::fields;

/// Predicate over a field bag.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Every nested condition holds
    All(Vec<Condition>),
    /// At least one nested condition holds
    Any(Vec<Condition>),
    /// A non-blank scalar under any of the aliases
    Scalar(&'static [&'static str]),
    /// The list has at least one row
    HasRows(&'static str),
    /// Some row of the list has a value for every alias group
    RowWith {
        list: &'static str,
        fields: Vec<&'static [&'static str]>,
    },
}

impl Condition {
    pub fn matches(&self, bag: &FieldBag) -> bool {
        match self {
            Condition::All(all) => all.iter().all(|c| c.matches(bag)),
            Condition::Any(any) => any.iter().any(|c| c.matches(bag)),
            Condition::Scalar(names) => bag.has_any_scalar(names),
            Condition::HasRows(list) => !bag.rows(list).is_empty(),
            Condition::RowWith { list, fields } => bag
                .rows(list)
                .iter()
                .any(|row| fields.iter().all(|names| row_text(row, names).is_some())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierRule {
    pub name: &'static str,
    pub table: DestinationTable,
    pub when: Condition,
}

/// Default rule table, in priority order.
pub fn default_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule {
            name: "tax_id_and_legal_name",
            table: DestinationTable::Supplier,
            when: Condition::All(vec![
                Condition::Scalar(fields::TAX_ID),
                Condition::Scalar(fields::LEGAL_NAME),
            ]),
        },
        ClassifierRule {
            name: "monthly_waste_breakdown",
            table: DestinationTable::WasteLog,
            when: Condition::Any(vec![
                Condition::RowWith {
                    list: LINE_ITEMS,
                    fields: vec![fields::MONTH, fields::QUANTITY],
                },
                Condition::All(vec![
                    Condition::Scalar(&["waste_type", "residuo"]),
                    Condition::Scalar(fields::QUANTITY),
                    Condition::Scalar(fields::MONTH),
                ]),
            ]),
        },
        ClassifierRule {
            name: "license_conditions",
            table: DestinationTable::LicenseConditions,
            when: Condition::Any(vec![
                Condition::HasRows(CONDITIONS),
                Condition::Scalar(fields::LICENSE_NUMBER),
            ]),
        },
    ]
}

/// Routing decision with its explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub table: DestinationTable,
    /// Table name as declared by the extraction
    pub declared: Option<String>,
    /// The declared table was present and differs from the chosen one
    pub overridden: bool,
    /// Matching rule; `None` when the declared table was used
    pub rule: Option<&'static str>,
}

/// Classify a field bag. Pure: the same bag and rules always give the same table.
pub fn classify(
    bag: &FieldBag,
    declared: Option<&str>,
    rules: &[ClassifierRule],
) -> AppResult<Classification> {
    let declared_table = declared.and_then(DestinationTable::parse);
    let declared_name = declared
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    if let Some(rule) = rules.iter().find(|r| r.when.matches(bag)) {
        return Ok(Classification {
            table: rule.table,
            overridden: declared_name.is_some() && declared_table != Some(rule.table),
            declared: declared_name,
            rule: Some(rule.name),
        });
    }

    match declared_table {
        Some(table) => Ok(Classification {
            table,
            declared: declared_name,
            overridden: false,
            rule: None,
        }),
        None => Err(AppError::ValidationFailed(vec![FieldViolation {
            record: 0,
            field: "target_table".to_string(),
            message: format!(
                "Unclassifiable field set: no destination rule matched and declared table {:?} is unknown",
                declared_name.unwrap_or_default()
            ),
        }])),
    }
}

/// Classify and log a misrouted declaration.
pub fn classify_logged(
    bag: &FieldBag,
    declared: Option<&str>,
    rules: &[ClassifierRule],
) -> AppResult<Classification> {
    let classification = classify(bag, declared, rules)?;
    if classification.overridden {
        warn!(
            declared = classification.declared.as_deref().unwrap_or(""),
            derived = %classification.table,
            rule = classification.rule.unwrap_or(""),
            "Declared destination table overridden by classifier"
        );
    }
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(scalars: &[(&str, &str)]) -> FieldBag {
        let mut bag = FieldBag::default();
        for (k, v) in scalars {
            bag.scalars.insert(k.to_string(), v.to_string());
        }
        bag
    }

    #[test]
    fn test_tax_id_and_legal_name_is_supplier_whatever_declared() {
        let rules = default_rules();
        let bag = bag(&[("cnpj", "12.345.678/0001-90"), ("razao_social", "Recicla Sul")]);

        for declared in [Some("waste_log"), Some("license_conditions"), None, Some("junk")] {
            let c = classify(&bag, declared, &rules).unwrap();
            assert_eq!(c.table, DestinationTable::Supplier);
            assert_eq!(c.rule, Some("tax_id_and_legal_name"));
        }

        let c = classify(&bag, Some("waste_log"), &rules).unwrap();
        assert!(c.overridden);
        assert_eq!(c.declared.as_deref(), Some("waste_log"));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let rules = default_rules();
        let mut bag = bag(&[("license_number", "LO-1")]);
        bag.rows.insert(
            LINE_ITEMS.into(),
            vec![json!({"month": "jan", "quantity": 3}).as_object().cloned().unwrap()],
        );
        let first = classify(&bag, Some("supplier"), &rules).unwrap();
        let second = classify(&bag, Some("supplier"), &rules).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.table, DestinationTable::WasteLog);
    }

    #[test]
    fn test_conditions_route_to_license_conditions() {
        let rules = default_rules();
        let mut bag = FieldBag::default();
        bag.rows.insert(
            CONDITIONS.into(),
            vec![json!({"text": "Monitorar efluentes"}).as_object().cloned().unwrap()],
        );
        let c = classify(&bag, Some("license_conditions"), &rules).unwrap();
        assert_eq!(c.table, DestinationTable::LicenseConditions);
        assert!(!c.overridden);
    }

    #[test]
    fn test_falls_back_to_declared_table() {
        let rules = default_rules();
        let bag = bag(&[("email", "a@b.com")]);
        let c = classify(&bag, Some("Suppliers"), &rules).unwrap();
        assert_eq!(c.table, DestinationTable::Supplier);
        assert_eq!(c.rule, None);
        assert!(!c.overridden);
    }

    #[test]
    fn test_unclassifiable_is_validation_error() {
        let rules = default_rules();
        let bag = bag(&[("email", "a@b.com")]);
        assert!(matches!(
            classify(&bag, Some("cash_flow"), &rules),
            Err(AppError::ValidationFailed(_))
        ));
        assert!(classify(&bag, None, &rules).is_err());
    }
}
