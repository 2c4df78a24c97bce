//! Field rules and value parsing shared by the transformers.

use chrono::NaiveDate;

use crate::error::FieldViolation;

/// A rule a single field value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Must be present
    Required,
    /// If present, must contain non-whitespace text
    NonEmpty,
    /// If present, must parse as a number greater than zero
    PositiveNumber,
    /// If present, must parse as a calendar date
    ValidDate,
}

impl FieldRule {
    /// Check a value. Absent values only fail `Required`.
    pub fn check(&self, value: Option<&str>) -> Result<(), String> {
        match (self, value) {
            (FieldRule::Required, None) => Err("is required".to_string()),
            (FieldRule::NonEmpty, Some(v)) if v.trim().is_empty() => {
                Err("must not be empty".to_string())
            }
            (FieldRule::PositiveNumber, Some(v)) => match parse_decimal(v) {
                Some(n) if n > 0.0 => Ok(()),
                Some(_) => Err(format!("must be a positive number, got '{}'", v.trim())),
                None => Err(format!("'{}' is not a number", v.trim())),
            },
            (FieldRule::ValidDate, Some(v)) => parse_date(v)
                .map(|_| ())
                .ok_or_else(|| format!("'{}' is not a valid date", v.trim())),
            _ => Ok(()),
        }
    }
}

/// Violations collected across a candidate batch.
#[derive(Debug, Default)]
pub struct Violations {
    list: Vec<FieldViolation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: usize, field: &str, message: impl Into<String>) {
        self.list.push(FieldViolation {
            record,
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Apply rules in order, recording only the first failure for the field.
    /// Returns whether the value passed.
    pub fn check(
        &mut self,
        record: usize,
        field: &str,
        value: Option<&str>,
        rules: &[FieldRule],
    ) -> bool {
        for rule in rules {
            if let Err(message) = rule.check(value) {
                self.push(record, field, message);
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, Vec<FieldViolation>> {
        if self.list.is_empty() {
            Ok(value)
        } else {
            Err(self.list)
        }
    }
}

/// Parse a decimal written with either `.` or `,` as separator.
///
/// `1.234,5` and `1,234.5` both read as 1234.5; a lone comma is decimal.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let s: String = raw.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }

    let normalized = match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        _ => s,
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Parse ISO (`2024-03-15`) or day-first (`15/03/2024`, `15-03-2024`) dates.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Parse a whole positive number of days, e.g. `90`, `90.0` or `90 dias`.
pub fn parse_days(raw: &str) -> Option<i64> {
    let token = raw.split_whitespace().next()?;
    let value = parse_decimal(token)?;
    if value.fract() == 0.0 && value > 0.0 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
