//! Supplier transformer.

use crate::error::FieldViolation;
use crate::models::{DestinationRecord, DestinationTable, FieldBag, SupplierRecord};

use super::fields;
use super::validation::{FieldRule, Violations};
use super::{RecordTransformer, TransformContext};

/// Keep only the digits of a tax / registration id.
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub struct SupplierTransformer;

impl RecordTransformer for SupplierTransformer {
    fn destination(&self) -> DestinationTable {
        DestinationTable::Supplier
    }

    fn transform(
        &self,
        bag: &FieldBag,
        _ctx: &TransformContext<'_>,
    ) -> Result<Vec<DestinationRecord>, Vec<FieldViolation>> {
        let mut violations = Violations::new();

        let legal_name = bag.first_scalar(fields::LEGAL_NAME);
        violations.check(0, "legal_name", legal_name, &[FieldRule::Required]);

        let tax_id = bag.first_scalar(fields::TAX_ID).map(normalize_tax_id);
        if violations.check(0, "tax_id", tax_id.as_deref(), &[FieldRule::Required])
            && tax_id.as_deref().is_some_and(str::is_empty)
        {
            violations.push(0, "tax_id", "must contain digits");
        }

        let email = bag.first_scalar(fields::EMAIL).map(str::to_lowercase);
        if let Some(email) = &email {
            let valid = email
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
            if !valid {
                violations.push(0, "email", format!("'{}' is not a valid email", email));
            }
        }

        let (Some(legal_name), Some(tax_id)) = (legal_name, tax_id) else {
            return violations.into_result(Vec::new());
        };
        if !violations.is_empty() {
            return violations.into_result(Vec::new());
        }

        let text = |names: &[&str]| bag.first_scalar(names).map(str::to_string);

        Ok(vec![DestinationRecord::Supplier(SupplierRecord {
            legal_name: legal_name.to_string(),
            trade_name: text(fields::TRADE_NAME),
            tax_id,
            email,
            phone: text(fields::PHONE),
            category: text(fields::CATEGORY),
            city: text(fields::CITY),
            state: bag.first_scalar(fields::STATE).map(str::to_uppercase),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transform::waste::default_hazard_rules;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn transform(pairs: &[(&str, &str)]) -> Result<Vec<DestinationRecord>, Vec<FieldViolation>> {
        let mut bag = FieldBag::default();
        for (k, v) in pairs {
            bag.scalars.insert(k.to_string(), v.to_string());
        }
        let rules = default_hazard_rules();
        let ctx = TransformContext {
            preview_id: Uuid::nil(),
            today: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            hazard_rules: &rules,
        };
        SupplierTransformer.transform(&bag, &ctx)
    }

    #[test]
    fn test_supplier_from_aliases() {
        let records = transform(&[
            ("razao_social", "Recicla Sul Ltda"),
            ("cnpj", "12.345.678/0001-90"),
            ("email", "Contato@ReciclaSul.com.br"),
            ("uf", "rs"),
        ])
        .unwrap();

        match &records[0] {
            DestinationRecord::Supplier(s) => {
                assert_eq!(s.legal_name, "Recicla Sul Ltda");
                assert_eq!(s.tax_id, "12345678000190");
                assert_eq!(s.email.as_deref(), Some("contato@reciclasul.com.br"));
                assert_eq!(s.state.as_deref(), Some("RS"));
            }
            other => panic!("expected supplier, got {:?}", other),
        }
    }

    #[test]
    fn test_all_violations_reported() {
        let violations = transform(&[("cnpj", "n/a"), ("email", "nobody")]).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["legal_name", "tax_id", "email"]);
    }
}
